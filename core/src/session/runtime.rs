//! 单个发布会话的运行时。
//!
//! 一个任务独占会话状态，依次处理界面指令、宿主页面事件与倒计时信号，每轮处理后推送一次
//! 完整快照。所有状态变更都在这里串行发生。

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::binding::LoadTransition;
use super::dispatcher::InjectionDispatcher;
use super::handle::SessionCommand;
use super::lifecycle::{EndReason, SessionLifecycleUpdate, SessionPhase};
use super::state::PublishSession;
use super::timer::{AutoCloseTimer, TimerEvent, TimerSignal};
use crate::host::{PageEvent, PageHandle, PageHost, PageLoadStatus};
use crate::platform::PlatformRegistry;
use crate::rehost::ResourceRehoster;
use crate::telemetry::events::{
    record_rehost_summary, record_session_ended, record_session_started,
};

const TARGET: &str = "session_runtime";
const GROUP_LABEL_PREFIX: &str = "MultiPost";
const TIMER_SIGNAL_CAPACITY: usize = 8;

pub(crate) struct SessionRuntime {
    session: PublishSession,
    host: Arc<dyn PageHost>,
    registry: Arc<PlatformRegistry>,
    rehoster: Arc<ResourceRehoster>,
    dispatcher: InjectionDispatcher,
    timer: AutoCloseTimer,
    timer_rx: mpsc::Receiver<TimerSignal>,
    command_rx: mpsc::Receiver<SessionCommand>,
    page_events: broadcast::Receiver<PageEvent>,
    status_tx: watch::Sender<super::SessionStatus>,
    lifecycle_tx: broadcast::Sender<SessionLifecycleUpdate>,
}

pub(crate) struct RuntimeParts {
    pub session: PublishSession,
    pub host: Arc<dyn PageHost>,
    pub registry: Arc<PlatformRegistry>,
    pub rehoster: Arc<ResourceRehoster>,
    pub command_rx: mpsc::Receiver<SessionCommand>,
    pub page_events: broadcast::Receiver<PageEvent>,
    pub status_tx: watch::Sender<super::SessionStatus>,
    pub lifecycle_tx: broadcast::Sender<SessionLifecycleUpdate>,
}

impl SessionRuntime {
    pub(crate) fn new(parts: RuntimeParts) -> Self {
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_SIGNAL_CAPACITY);
        let dispatcher = InjectionDispatcher::new(
            parts.session.id.clone(),
            Arc::clone(&parts.host),
            parts.session.request.auto_submit,
        );

        Self {
            session: parts.session,
            host: parts.host,
            registry: parts.registry,
            rehoster: parts.rehoster,
            dispatcher,
            timer: AutoCloseTimer::new(timer_tx),
            timer_rx,
            command_rx: parts.command_rx,
            page_events: parts.page_events,
            status_tx: parts.status_tx,
            lifecycle_tx: parts.lifecycle_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        self.preprocess().await;
        self.open_pages().await;
        self.enter_idle();

        let mut events_open = true;
        while self.session.phase != SessionPhase::Ended {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        info!(
                            target: TARGET,
                            session_id = %self.session.id,
                            "all session handles dropped, ending without closing pages"
                        );
                        self.end(false, EndReason::Abandoned).await;
                    }
                },
                event = self.page_events.recv(), if events_open => match event {
                    Ok(event) => self.handle_page_event(event),
                    Err(RecvError::Lagged(skipped)) => self.reconcile_pages(skipped).await,
                    Err(RecvError::Closed) => {
                        warn!(
                            target: TARGET,
                            session_id = %self.session.id,
                            "page host event stream closed"
                        );
                        events_open = false;
                    }
                },
                Some(signal) = self.timer_rx.recv() => self.handle_timer(signal).await,
            }

            self.publish_status();
        }

        debug!(target: TARGET, session_id = %self.session.id, "session runtime stopped");
    }

    async fn preprocess(&mut self) {
        let pending = self
            .session
            .request
            .payload
            .resources()
            .into_iter()
            .filter(|file| file.is_remote())
            .count();
        self.session.processing_notice = (pending > 0)
            .then(|| format!("正在转存 {pending} 个媒体文件，请稍候…"));
        self.set_phase(SessionPhase::Preprocessing);

        let report = self
            .rehoster
            .rehost(&self.session.id, self.session.request.payload.clone())
            .await;
        record_rehost_summary(
            &self.session.id,
            report.files.len(),
            report.rehosted_count(),
            report.failed_count(),
        );
        for message in report.error_messages() {
            self.session.push_error(message);
        }
        self.session.request.payload = report.payload;
    }

    async fn open_pages(&mut self) {
        let category = self.session.request.payload.category();
        let targets = self.session.request.targets.clone();
        self.session.processing_notice = Some(format!("正在打开 {} 个发布平台…", targets.len()));
        self.set_phase(SessionPhase::Dispatching);

        let mut opened: Vec<PageHandle> = Vec::new();
        for selection in targets {
            let Some(descriptor) = self.registry.resolve(&selection.identifier).await else {
                warn!(
                    target: TARGET,
                    session_id = %self.session.id,
                    destination = %selection.identifier,
                    "unknown destination skipped"
                );
                self.session
                    .push_error(format!("未知的发布平台：{}", selection.identifier));
                continue;
            };

            if descriptor.category != category {
                warn!(
                    target: TARGET,
                    session_id = %self.session.id,
                    destination = %descriptor.identifier,
                    expected = category.as_str(),
                    actual = descriptor.category.as_str(),
                    "destination does not accept this content category"
                );
                self.session.push_error(format!(
                    "平台 {} 不支持发布{}类型的内容",
                    descriptor.identifier,
                    category.as_str()
                ));
                continue;
            }

            for url in descriptor.target_urls() {
                match self.host.open_page(url).await {
                    Ok(page) => {
                        if self.session.bindings.register(
                            page,
                            descriptor.clone(),
                            url.clone(),
                            selection.extra_config.clone(),
                        ) {
                            opened.push(page);
                        } else {
                            warn!(
                                target: TARGET,
                                session_id = %self.session.id,
                                %page,
                                "page host returned a handle that is already bound"
                            );
                        }
                    }
                    Err(err) => {
                        warn!(
                            target: TARGET,
                            session_id = %self.session.id,
                            destination = %descriptor.identifier,
                            %url,
                            %err,
                            "failed to open destination page"
                        );
                        self.session.push_error(format!(
                            "无法打开平台 {} 的发布页面 {url}：{err}",
                            descriptor.identifier
                        ));
                    }
                }
            }
        }

        if opened.is_empty() {
            return;
        }

        let label = group_label();
        if let Err(err) = self.host.group_pages(&opened, &label).await {
            warn!(
                target: TARGET,
                session_id = %self.session.id,
                %err,
                "failed to group destination pages"
            );
            self.session.push_error(format!("页面分组失败：{err}"));
        }
    }

    fn enter_idle(&mut self) {
        self.session.processing_notice = None;
        if self.session.auto_close.enabled {
            self.timer
                .arm(Duration::from_secs(self.session.auto_close.delay_secs));
        }
        self.set_phase(SessionPhase::Idle);

        record_session_started(
            &self.session.id,
            self.session.request.targets.len(),
            self.session.bindings.len(),
            self.session.request.auto_submit,
        );
    }

    fn handle_page_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::Updated {
                page,
                status: PageLoadStatus::Complete,
                url,
            } => match self.session.bindings.mark_loaded(page, url.as_deref()) {
                LoadTransition::Advanced => {
                    self.dispatcher.dispatch_when_ready(
                        &mut self.session.bindings,
                        page,
                        &self.session.request.payload,
                    );
                }
                LoadTransition::UrlMismatch => debug!(
                    target: TARGET,
                    session_id = %self.session.id,
                    %page,
                    url = url.as_deref().unwrap_or_default(),
                    "page finished loading an unexpected url"
                ),
                LoadTransition::AlreadyLoaded | LoadTransition::Unknown => {}
            },
            PageEvent::Updated { .. } => {}
            PageEvent::Removed { page } => {
                if let Some(binding) = self.session.bindings.remove(page) {
                    info!(
                        target: TARGET,
                        session_id = %self.session.id,
                        %page,
                        destination = %binding.destination.identifier,
                        "page removed by host, binding released"
                    );
                }
            }
        }
    }

    /// 事件订阅落后时丢失的消息无法补发，逐个向宿主查询仍在跟踪的页面。
    ///
    /// 已不存在的页面释放其绑定；已经加载完成的页面按一次完成事件处理。
    async fn reconcile_pages(&mut self, skipped: u64) {
        warn!(
            target: TARGET,
            session_id = %self.session.id,
            skipped,
            tracked = self.session.bindings.len(),
            "page event stream lagged, reconciling tracked pages with host"
        );

        let pages: Vec<PageHandle> = self
            .session
            .bindings
            .ordered()
            .into_iter()
            .map(|binding| binding.page)
            .collect();

        for page in pages {
            match self.host.page_state(page).await {
                Ok(Some(snapshot)) => self.handle_page_event(PageEvent::Updated {
                    page,
                    status: snapshot.status,
                    url: snapshot.url,
                }),
                Ok(None) => self.handle_page_event(PageEvent::Removed { page }),
                Err(err) => {
                    warn!(
                        target: TARGET,
                        session_id = %self.session.id,
                        %page,
                        %err,
                        "failed to query page state"
                    );
                    self.session
                        .push_error(format!("页面 {page} 的状态同步失败：{err}"));
                }
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        debug!(target: TARGET, session_id = %self.session.id, ?command, "session command");
        match command {
            SessionCommand::Reload { page } => self.reload_page(page).await,
            SessionCommand::Close { page } => self.close_page(page).await,
            SessionCommand::CloseAll => self.close_all_pages().await,
            SessionCommand::End { close_pages } => {
                self.end(close_pages, EndReason::Requested).await
            }
            SessionCommand::SetAutoClose { delay_secs } => {
                self.session.auto_close.enabled = true;
                self.session.auto_close.delay_secs = delay_secs;
                self.timer.rearm(Duration::from_secs(delay_secs));
            }
            SessionCommand::CancelAutoClose => {
                self.session.auto_close.enabled = false;
                self.timer.disarm();
            }
            SessionCommand::SetAutoClosePages { close_pages } => {
                self.session.auto_close.close_pages = close_pages;
            }
        }
    }

    async fn handle_timer(&mut self, signal: TimerSignal) {
        match self.timer.accept(signal) {
            Some(TimerEvent::Fired) => {
                info!(
                    target: TARGET,
                    session_id = %self.session.id,
                    close_pages = self.session.auto_close.close_pages,
                    "auto-close countdown elapsed"
                );
                let close_pages = self.session.auto_close.close_pages;
                self.end(close_pages, EndReason::AutoClose).await;
            }
            Some(TimerEvent::Tick { .. }) | None => {}
        }
    }

    async fn reload_page(&mut self, page: PageHandle) {
        let Some(url) = self.session.bindings.reset_for_reload(page) else {
            debug!(target: TARGET, session_id = %self.session.id, %page, "reload for unknown page ignored");
            return;
        };

        if let Err(err) = self.host.navigate_page(page, &url).await {
            warn!(
                target: TARGET,
                session_id = %self.session.id,
                %page,
                %err,
                "failed to reload destination page"
            );
            self.session.push_error(format!("重新加载页面 {page} 失败：{err}"));
        }
    }

    async fn close_page(&mut self, page: PageHandle) {
        let Some(binding) = self.session.bindings.remove(page) else {
            debug!(target: TARGET, session_id = %self.session.id, %page, "close for unknown page ignored");
            return;
        };

        if let Err(err) = self.host.close_page(page).await {
            warn!(
                target: TARGET,
                session_id = %self.session.id,
                %page,
                %err,
                "failed to close destination page"
            );
            self.session.push_error(format!(
                "关闭平台 {} 的页面失败：{err}",
                binding.destination.identifier
            ));
        }
    }

    async fn close_all_pages(&mut self) {
        for binding in self.session.bindings.drain() {
            if let Err(err) = self.host.close_page(binding.page).await {
                warn!(
                    target: TARGET,
                    session_id = %self.session.id,
                    page = %binding.page,
                    %err,
                    "failed to close destination page"
                );
                self.session.push_error(format!(
                    "关闭平台 {} 的页面失败：{err}",
                    binding.destination.identifier
                ));
            }
        }
    }

    async fn end(&mut self, close_pages: bool, reason: EndReason) {
        self.timer.disarm();
        let open_pages = self.session.bindings.len();

        if close_pages {
            self.close_all_pages().await;
            // 页面未关闭时缓存由启动时的过期清理回收。
            if let Err(err) = self.rehoster.release(&self.session.id).await {
                warn!(
                    target: TARGET,
                    session_id = %self.session.id,
                    %err,
                    "failed to release session cache"
                );
            }
        }

        self.session.phase = SessionPhase::Ended;
        self.emit_lifecycle(SessionLifecycleUpdate::ended(&self.session.id, reason));
        record_session_ended(
            &self.session.id,
            reason.as_str(),
            self.session.errors().len(),
            open_pages,
        );
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        self.session.phase = phase;
        self.emit_lifecycle(SessionLifecycleUpdate::phase(&self.session.id, phase));
        self.publish_status();
    }

    fn emit_lifecycle(&self, update: SessionLifecycleUpdate) {
        // 没有订阅者时发送失败是正常情况。
        if self.lifecycle_tx.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.lifecycle_tx.send(update) {
            warn!(
                target: TARGET,
                %err,
                "failed to broadcast lifecycle update"
            );
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.session.snapshot(&self.timer));
    }
}

fn group_label() -> String {
    format!(
        "{GROUP_LABEL_PREFIX} {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_label_carries_timestamp() {
        let label = group_label();
        assert!(label.starts_with("MultiPost "));
        // "YYYY-MM-DD HH:MM:SS"
        assert_eq!(label.len(), "MultiPost ".len() + 19);
    }
}
