//! 会话状态快照与生命周期广播负载定义。

use serde::Serialize;

use super::binding::{BindingStatus, TabBinding};
use crate::host::PageHandle;

/// 会话状态机的阶段划分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// 正在转存媒体文件。
    Preprocessing,
    /// 正在打开并分组发布页面。
    Dispatching,
    /// 页面已全部打开，等待页面加载、用户操作或自动关闭。
    Idle,
    Ended,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Preprocessing => "preprocessing",
            SessionPhase::Dispatching => "dispatching",
            SessionPhase::Idle => "idle",
            SessionPhase::Ended => "ended",
        }
    }
}

/// 会话结束的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Requested,
    AutoClose,
    /// 所有句柄都已释放。
    Abandoned,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Requested => "requested",
            EndReason::AutoClose => "auto_close",
            EndReason::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingView {
    pub page: PageHandle,
    pub identifier: String,
    pub target_url: String,
    pub status: BindingStatus,
    pub dispatch_count: u32,
    pub reload_count: u32,
}

impl From<&TabBinding> for BindingView {
    fn from(binding: &TabBinding) -> Self {
        Self {
            page: binding.page,
            identifier: binding.destination.identifier.clone(),
            target_url: binding.target_url.clone(),
            status: binding.status,
            dispatch_count: binding.dispatch_count,
            reload_count: binding.reload_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCloseView {
    pub armed: bool,
    /// 最近一次计算出的剩余秒数；停止后保持停止时的值。
    pub remaining_secs: Option<u64>,
    pub delay_secs: u64,
    pub close_pages: bool,
}

/// 面向界面的会话快照，每次状态变化后整体推送。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub title: String,
    pub phase: SessionPhase,
    pub processing_notice: Option<String>,
    pub bindings: Vec<BindingView>,
    /// 只追加的错误消息。
    pub errors: Vec<String>,
    pub auto_close: AutoCloseView,
}

impl SessionStatus {
    pub fn binding(&self, page: PageHandle) -> Option<&BindingView> {
        self.bindings.iter().find(|binding| binding.page == page)
    }

    pub fn is_ended(&self) -> bool {
        self.phase == SessionPhase::Ended
    }
}

/// 生命周期事件，所有会话共用一个广播通道。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLifecycleUpdate {
    pub session_id: String,
    pub phase: SessionPhase,
    pub end_reason: Option<EndReason>,
}

impl SessionLifecycleUpdate {
    pub fn phase(session_id: &str, phase: SessionPhase) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase,
            end_reason: None,
        }
    }

    pub fn ended(session_id: &str, reason: EndReason) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: SessionPhase::Ended,
            end_reason: Some(reason),
        }
    }
}
