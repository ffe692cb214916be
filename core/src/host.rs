//! 浏览器宿主的页面生命周期接口。
//!
//! 编排层只通过这里的 trait 与宿主交互：打开、分组、导航、关闭页面，以及在页面自身的执行上下文中
//! 运行平台自动化脚本。页面事件以广播方式按投递顺序推送。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::content::ContentPayload;
use crate::platform::{Capability, DestinationDescriptor};

/// 宿主分配的页面句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageHandle(pub u64);

impl fmt::Display for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLoadStatus {
    Loading,
    Complete,
}

/// 宿主推送的页面生命周期事件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageEvent {
    Updated {
        page: PageHandle,
        status: PageLoadStatus,
        #[serde(default)]
        url: Option<String>,
    },
    Removed {
        page: PageHandle,
    },
}

impl PageEvent {
    pub fn page(&self) -> PageHandle {
        match self {
            PageEvent::Updated { page, .. } | PageEvent::Removed { page } => *page,
        }
    }
}

/// 宿主当前记录的页面状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub status: PageLoadStatus,
    #[serde(default)]
    pub url: Option<String>,
}

/// 在页面上下文中执行自动化脚本时传入的参数。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInvocation {
    pub capability: Capability,
    /// 页面侧脚本的入口函数名。
    pub entry_point: &'static str,
    pub payload: ContentPayload,
    pub auto_submit: bool,
    pub destination: DestinationDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_config: Option<serde_json::Value>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("page {0} no longer exists")]
    PageNotFound(PageHandle),
    #[error("page host unavailable: {message}")]
    Unavailable { message: String },
    #[error("page host operation failed: {message}")]
    Other { message: String },
}

impl HostError {
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait PageHost: Send + Sync {
    async fn open_page(&self, url: &str) -> Result<PageHandle, HostError>;

    async fn close_page(&self, page: PageHandle) -> Result<(), HostError>;

    async fn group_pages(&self, pages: &[PageHandle], label: &str) -> Result<(), HostError>;

    /// 在页面自身的执行上下文中运行自动化脚本。调用方不等待脚本的内部行为。
    async fn run_in_page_context(
        &self,
        page: PageHandle,
        invocation: CapabilityInvocation,
    ) -> Result<(), HostError>;

    async fn navigate_page(&self, page: PageHandle, url: &str) -> Result<(), HostError>;

    /// 查询页面当前状态，页面已关闭时返回 `None`。事件订阅丢失消息后用于对账。
    async fn page_state(&self, page: PageHandle) -> Result<Option<PageSnapshot>, HostError>;

    /// 订阅页面更新与移除事件。
    fn subscribe_events(&self) -> broadcast::Receiver<PageEvent>;
}


#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MockState {
        opened: Vec<(PageHandle, String)>,
        closed: Vec<PageHandle>,
        groups: Vec<(Vec<PageHandle>, String)>,
        invocations: Vec<(PageHandle, CapabilityInvocation)>,
        navigations: Vec<(PageHandle, String)>,
        failing_opens: HashSet<String>,
        failing_closes: HashSet<PageHandle>,
        fail_grouping: bool,
    }

    /// 记录所有调用的内存宿主，页面事件由测试手动推送。
    pub(crate) struct MockPageHost {
        next_page: AtomicU64,
        events: broadcast::Sender<PageEvent>,
        state: Mutex<MockState>,
        /// 仍然存在的页面，`complete`/`remove` 同步更新。
        live: StdMutex<HashMap<PageHandle, PageSnapshot>>,
    }

    impl MockPageHost {
        pub(crate) fn new() -> Arc<Self> {
            Self::with_event_capacity(256)
        }

        pub(crate) fn with_event_capacity(capacity: usize) -> Arc<Self> {
            let (events, _) = broadcast::channel(capacity);
            Arc::new(Self {
                next_page: AtomicU64::new(100),
                events,
                state: Mutex::new(MockState::default()),
                live: StdMutex::new(HashMap::new()),
            })
        }

        pub(crate) fn emit(&self, event: PageEvent) {
            let _ = self.events.send(event);
        }

        pub(crate) fn complete(&self, page: PageHandle, url: &str) {
            if let Some(snapshot) = self.live.lock().unwrap().get_mut(&page) {
                snapshot.status = PageLoadStatus::Complete;
                snapshot.url = Some(url.to_string());
            }
            self.emit(PageEvent::Updated {
                page,
                status: PageLoadStatus::Complete,
                url: Some(url.to_string()),
            });
        }

        pub(crate) fn remove(&self, page: PageHandle) {
            self.live.lock().unwrap().remove(&page);
            self.emit(PageEvent::Removed { page });
        }

        pub(crate) async fn fail_open(&self, url: &str) {
            self.state.lock().await.failing_opens.insert(url.to_string());
        }

        pub(crate) async fn fail_close(&self, page: PageHandle) {
            self.state.lock().await.failing_closes.insert(page);
        }

        pub(crate) async fn fail_grouping(&self) {
            self.state.lock().await.fail_grouping = true;
        }

        pub(crate) async fn opened(&self) -> Vec<(PageHandle, String)> {
            self.state.lock().await.opened.clone()
        }

        pub(crate) async fn closed(&self) -> Vec<PageHandle> {
            self.state.lock().await.closed.clone()
        }

        pub(crate) async fn groups(&self) -> Vec<(Vec<PageHandle>, String)> {
            self.state.lock().await.groups.clone()
        }

        pub(crate) async fn invocations(&self) -> Vec<(PageHandle, CapabilityInvocation)> {
            self.state.lock().await.invocations.clone()
        }

        pub(crate) async fn navigations(&self) -> Vec<(PageHandle, String)> {
            self.state.lock().await.navigations.clone()
        }
    }

    #[async_trait]
    impl PageHost for MockPageHost {
        async fn open_page(&self, url: &str) -> Result<PageHandle, HostError> {
            let mut state = self.state.lock().await;
            if state.failing_opens.contains(url) {
                return Err(HostError::other(format!("refused to open {url}")));
            }
            let page = PageHandle(self.next_page.fetch_add(1, Ordering::SeqCst));
            state.opened.push((page, url.to_string()));
            self.live.lock().unwrap().insert(
                page,
                PageSnapshot {
                    status: PageLoadStatus::Loading,
                    url: Some(url.to_string()),
                },
            );
            Ok(page)
        }

        async fn close_page(&self, page: PageHandle) -> Result<(), HostError> {
            {
                let mut state = self.state.lock().await;
                if state.failing_closes.contains(&page) {
                    return Err(HostError::PageNotFound(page));
                }
                state.closed.push(page);
            }
            self.remove(page);
            Ok(())
        }

        async fn group_pages(&self, pages: &[PageHandle], label: &str) -> Result<(), HostError> {
            let mut state = self.state.lock().await;
            if state.fail_grouping {
                return Err(HostError::unavailable("tab groups disabled"));
            }
            state.groups.push((pages.to_vec(), label.to_string()));
            Ok(())
        }

        async fn run_in_page_context(
            &self,
            page: PageHandle,
            invocation: CapabilityInvocation,
        ) -> Result<(), HostError> {
            self.state.lock().await.invocations.push((page, invocation));
            Ok(())
        }

        async fn navigate_page(&self, page: PageHandle, url: &str) -> Result<(), HostError> {
            if let Some(snapshot) = self.live.lock().unwrap().get_mut(&page) {
                snapshot.status = PageLoadStatus::Loading;
                snapshot.url = Some(url.to_string());
            }
            self.state
                .lock()
                .await
                .navigations
                .push((page, url.to_string()));
            Ok(())
        }

        async fn page_state(&self, page: PageHandle) -> Result<Option<PageSnapshot>, HostError> {
            Ok(self.live.lock().unwrap().get(&page).cloned())
        }

        fn subscribe_events(&self) -> broadcast::Receiver<PageEvent> {
            self.events.subscribe()
        }
    }
}
