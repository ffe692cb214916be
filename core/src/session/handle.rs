use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use super::error::PublishError;
use super::lifecycle::SessionStatus;
use crate::host::PageHandle;

/// 界面发往会话运行时的指令。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    Reload { page: PageHandle },
    Close { page: PageHandle },
    CloseAll,
    End { close_pages: bool },
    SetAutoClose { delay_secs: u64 },
    CancelAutoClose,
    SetAutoClosePages { close_pages: bool },
}

/// 发布会话的控制句柄。
///
/// 句柄可以克隆；全部句柄释放后会话结束，但不会关闭已打开的页面。
#[derive(Debug, Clone)]
pub struct PublishSessionHandle {
    session_id: String,
    command_tx: mpsc::Sender<SessionCommand>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl PublishSessionHandle {
    pub(super) fn new(
        session_id: String,
        command_tx: mpsc::Sender<SessionCommand>,
        status_rx: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self {
            session_id,
            command_tx,
            status_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn send(&self, command: SessionCommand) -> Result<(), PublishError> {
        match self.command_tx.send(command).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    target: "session_runtime",
                    session_id = %self.session_id,
                    command = ?err.0,
                    "session already ended, command dropped"
                );
                Err(PublishError::SessionClosed)
            }
        }
    }

    /// 重新导航到原始地址，加载完成后再次注入。
    pub async fn reload(&self, page: PageHandle) -> Result<(), PublishError> {
        self.send(SessionCommand::Reload { page }).await
    }

    pub async fn close(&self, page: PageHandle) -> Result<(), PublishError> {
        self.send(SessionCommand::Close { page }).await
    }

    /// 关闭所有页面，会话本身保持空闲。
    pub async fn close_all(&self) -> Result<(), PublishError> {
        self.send(SessionCommand::CloseAll).await
    }

    pub async fn end(&self, close_pages: bool) -> Result<(), PublishError> {
        self.send(SessionCommand::End { close_pages }).await
    }

    /// 以新的延迟重新开始倒计时。
    pub async fn set_auto_close(&self, delay_secs: u64) -> Result<(), PublishError> {
        self.send(SessionCommand::SetAutoClose { delay_secs }).await
    }

    pub async fn cancel_auto_close(&self) -> Result<(), PublishError> {
        self.send(SessionCommand::CancelAutoClose).await
    }

    pub async fn set_auto_close_pages(&self, close_pages: bool) -> Result<(), PublishError> {
        self.send(SessionCommand::SetAutoClosePages { close_pages })
            .await
    }

    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// 等待会话结束并返回最终快照。
    pub async fn wait_until_ended(&self) -> SessionStatus {
        let mut status_rx = self.status_rx.clone();
        if let Ok(status) = status_rx.wait_for(SessionStatus::is_ended).await {
            return status.clone();
        }
        // 运行时已退出，最后一次推送的快照即最终状态。
        let last = status_rx.borrow().clone();
        last
    }
}
