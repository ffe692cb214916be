use crate::config::AutoCloseConfig;
use crate::content::PublishRequest;

use super::binding::BindingRegistry;
use super::lifecycle::{AutoCloseView, BindingView, SessionPhase, SessionStatus};
use super::timer::AutoCloseTimer;

/// 一次发布动作的聚合状态，只由会话运行时持有。
#[derive(Debug)]
pub(crate) struct PublishSession {
    pub id: String,
    pub request: PublishRequest,
    pub phase: SessionPhase,
    pub processing_notice: Option<String>,
    pub bindings: BindingRegistry,
    pub auto_close: AutoCloseConfig,
    errors: Vec<String>,
}

impl PublishSession {
    pub fn new(id: String, request: PublishRequest, auto_close: AutoCloseConfig) -> Self {
        Self {
            id,
            request,
            phase: SessionPhase::Preprocessing,
            processing_notice: None,
            bindings: BindingRegistry::new(),
            auto_close,
            errors: Vec::new(),
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn snapshot(&self, timer: &AutoCloseTimer) -> SessionStatus {
        self.snapshot_with(timer.is_armed(), timer.countdown())
    }

    /// 运行时启动之前的快照，倒计时尚未开始。
    pub fn snapshot_initial(&self) -> SessionStatus {
        self.snapshot_with(false, None)
    }

    fn snapshot_with(&self, armed: bool, remaining_secs: Option<u64>) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            title: self.request.payload.title().to_string(),
            phase: self.phase,
            processing_notice: self.processing_notice.clone(),
            bindings: self
                .bindings
                .ordered()
                .into_iter()
                .map(BindingView::from)
                .collect(),
            errors: self.errors.clone(),
            auto_close: AutoCloseView {
                armed,
                remaining_secs,
                delay_secs: self.auto_close.delay_secs,
                close_pages: self.auto_close.close_pages,
            },
        }
    }
}
