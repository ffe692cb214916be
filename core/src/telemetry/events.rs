use serde::Serialize;
use tracing::{info, warn};

use crate::host::PageHandle;

pub(crate) const TARGET: &str = "telemetry::publish";
pub(crate) const EVENT_SESSION_STARTED: &str = "publish_session_started";
pub(crate) const EVENT_REHOST_SUMMARY: &str = "publish_rehost_summary";
pub(crate) const EVENT_BINDING_DISPATCHED: &str = "publish_binding_dispatched";
pub(crate) const EVENT_SESSION_ENDED: &str = "publish_session_ended";

#[derive(Debug, Serialize)]
pub struct SessionStartedEvent<'a> {
    pub session_id: &'a str,
    pub destinations: usize,
    pub pages: usize,
    pub auto_submit: bool,
}

#[derive(Debug, Serialize)]
pub struct RehostSummaryEvent<'a> {
    pub session_id: &'a str,
    pub total: usize,
    pub rehosted: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BindingDispatchedEvent<'a> {
    pub session_id: &'a str,
    pub page: PageHandle,
    pub destination: &'a str,
    pub dispatch_count: u32,
    pub auto_submit: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionEndedEvent<'a> {
    pub session_id: &'a str,
    pub reason: &'a str,
    pub errors: usize,
    pub open_pages: usize,
}

pub fn record_session_started(session_id: &str, destinations: usize, pages: usize, auto_submit: bool) {
    let event = SessionStartedEvent {
        session_id,
        destinations,
        pages,
        auto_submit,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_SESSION_STARTED,
            session_id = event.session_id,
            destinations = event.destinations,
            pages = event.pages,
            auto_submit = event.auto_submit,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_SESSION_STARTED,
            %err,
            "failed to encode session started event"
        ),
    }
}

pub fn record_rehost_summary(session_id: &str, total: usize, rehosted: usize, failed: usize) {
    let event = RehostSummaryEvent {
        session_id,
        total,
        rehosted,
        failed,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_REHOST_SUMMARY,
            session_id = event.session_id,
            total = event.total,
            rehosted = event.rehosted,
            failed = event.failed,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_REHOST_SUMMARY,
            %err,
            "failed to encode rehost summary event"
        ),
    }
}

pub fn record_binding_dispatched(
    session_id: &str,
    page: PageHandle,
    destination: &str,
    dispatch_count: u32,
    auto_submit: bool,
) {
    let event = BindingDispatchedEvent {
        session_id,
        page,
        destination,
        dispatch_count,
        auto_submit,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_BINDING_DISPATCHED,
            session_id = event.session_id,
            page = event.page.0,
            destination = event.destination,
            dispatch_count = event.dispatch_count,
            auto_submit = event.auto_submit,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_BINDING_DISPATCHED,
            %err,
            "failed to encode binding dispatched event"
        ),
    }
}

pub fn record_session_ended(session_id: &str, reason: &str, errors: usize, open_pages: usize) {
    let event = SessionEndedEvent {
        session_id,
        reason,
        errors,
        open_pages,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_SESSION_ENDED,
            session_id = event.session_id,
            reason = event.reason,
            errors = event.errors,
            open_pages = event.open_pages,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_SESSION_ENDED,
            %err,
            "failed to encode session ended event"
        ),
    }
}
