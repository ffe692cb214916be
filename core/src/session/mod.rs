//! 发布会话管理。
//!
//! 每次发布动作对应一个独立的会话运行时：先转存媒体，再按平台打开并分组页面，页面加载完成后
//! 注入自动化脚本，最后等待用户操作或自动关闭。会话之间不共享可变状态。

pub mod binding;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod lifecycle;
mod runtime;
mod state;
pub mod timer;

pub use binding::{BindingRegistry, BindingStatus, TabBinding};
pub use dispatcher::InjectionDispatcher;
pub use error::PublishError;
pub use handle::{PublishSessionHandle, SessionCommand};
pub use lifecycle::{
    AutoCloseView, BindingView, EndReason, SessionLifecycleUpdate, SessionPhase, SessionStatus,
};
pub use timer::{AutoCloseTimer, TimerEvent, TimerSignal};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::info;
use uuid::Uuid;

use crate::config::{AutoCloseConfig, ServiceConfig};
use crate::content::PublishRequest;
use crate::host::PageHost;
use crate::platform::{OverlayStore, PlatformRegistry};
use crate::rehost::ResourceRehoster;

use self::runtime::{RuntimeParts, SessionRuntime};
use self::state::PublishSession;

const COMMAND_CAPACITY: usize = 32;
const LIFECYCLE_CAPACITY: usize = 64;

pub struct SessionManager {
    host: Arc<dyn PageHost>,
    registry: Arc<PlatformRegistry>,
    rehoster: Arc<ResourceRehoster>,
    auto_close: AutoCloseConfig,
    lifecycle_tx: broadcast::Sender<SessionLifecycleUpdate>,
}

impl SessionManager {
    pub fn new(config: &ServiceConfig, host: Arc<dyn PageHost>, store: Arc<dyn OverlayStore>) -> Self {
        Self::from_parts(
            config,
            host,
            Arc::new(PlatformRegistry::builtin(store)),
            Arc::new(ResourceRehoster::with_http(config.rehost.clone())),
        )
    }

    pub fn from_parts(
        config: &ServiceConfig,
        host: Arc<dyn PageHost>,
        registry: Arc<PlatformRegistry>,
        rehoster: Arc<ResourceRehoster>,
    ) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        Self {
            host,
            registry,
            rehoster,
            auto_close: config.auto_close,
            lifecycle_tx,
        }
    }

    pub fn registry(&self) -> Arc<PlatformRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<SessionLifecycleUpdate> {
        self.lifecycle_tx.subscribe()
    }

    /// 校验请求并启动一个新的发布会话。
    ///
    /// 返回控制句柄与状态订阅。会话在后台任务中推进，首个快照处于 `Preprocessing` 阶段。
    pub fn start_publish(
        &self,
        request: PublishRequest,
    ) -> Result<(PublishSessionHandle, watch::Receiver<SessionStatus>), PublishError> {
        request.validate()?;

        let session_id = Uuid::new_v4().to_string();
        info!(
            target: "session_manager",
            %session_id,
            category = request.payload.category().as_str(),
            destinations = request.targets.len(),
            auto_submit = request.auto_submit,
            "starting publish session"
        );

        let session = PublishSession::new(session_id.clone(), request, self.auto_close);
        let (status_tx, status_rx) = watch::channel(session.snapshot_initial());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        // 先订阅再打开页面，避免漏掉最早的加载事件。
        let page_events = self.host.subscribe_events();

        let runtime = SessionRuntime::new(RuntimeParts {
            session,
            host: Arc::clone(&self.host),
            registry: Arc::clone(&self.registry),
            rehoster: Arc::clone(&self.rehoster),
            command_rx,
            page_events,
            status_tx,
            lifecycle_tx: self.lifecycle_tx.clone(),
        });
        tokio::spawn(runtime.run());

        let handle = PublishSessionHandle::new(session_id, command_tx, status_rx.clone());
        Ok((handle, status_rx))
    }
}
