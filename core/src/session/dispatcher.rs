//! 页面加载完成后注入平台自动化脚本。

use std::sync::Arc;

use tracing::{debug, warn};

use super::binding::BindingRegistry;
use crate::content::ContentPayload;
use crate::host::{CapabilityInvocation, PageHandle, PageHost};
use crate::telemetry::events::record_binding_dispatched;

const TARGET: &str = "injection_dispatcher";

pub struct InjectionDispatcher {
    session_id: String,
    host: Arc<dyn PageHost>,
    auto_submit: bool,
}

impl InjectionDispatcher {
    pub fn new(session_id: impl Into<String>, host: Arc<dyn PageHost>, auto_submit: bool) -> Self {
        Self {
            session_id: session_id.into(),
            host,
            auto_submit,
        }
    }

    /// 绑定处于 `Loaded` 时推进到 `Dispatched` 并异步注入，返回是否发起了注入。
    ///
    /// 状态在发起调用之前就已推进，同一次加载不会重复注入。注入失败只记录日志，
    /// 页面仍留给用户手动处理。
    pub fn dispatch_when_ready(
        &self,
        bindings: &mut BindingRegistry,
        page: PageHandle,
        payload: &ContentPayload,
    ) -> bool {
        let Some(binding) = bindings.begin_dispatch(page) else {
            debug!(target: TARGET, %page, "binding not ready for dispatch");
            return false;
        };

        let invocation = CapabilityInvocation {
            capability: binding.destination.capability,
            entry_point: binding.destination.capability.entry_point(),
            payload: payload.clone(),
            auto_submit: self.auto_submit,
            destination: binding.destination.clone(),
            extra_config: binding.extra_config.clone(),
        };

        record_binding_dispatched(
            &self.session_id,
            page,
            &binding.destination.identifier,
            binding.dispatch_count,
            self.auto_submit,
        );

        let host = Arc::clone(&self.host);
        let session_id = self.session_id.clone();
        let identifier = binding.destination.identifier;
        tokio::spawn(async move {
            if let Err(err) = host.run_in_page_context(page, invocation).await {
                warn!(
                    target: TARGET,
                    %session_id,
                    %page,
                    destination = %identifier,
                    %err,
                    "capability injection failed"
                );
            }
        });

        true
    }
}
