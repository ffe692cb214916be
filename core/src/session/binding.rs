//! 页面与发布平台之间的绑定表。
//!
//! 绑定表只由会话运行时持有和修改。状态只向前推进，唯一的例外是用户主动重新加载时回到
//! `Opened`，以便重新走一遍 `Loaded → Dispatched`。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::host::PageHandle;
use crate::platform::{url_matches, DestinationDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    Opened,
    Loaded,
    Dispatched,
    Closed,
}

impl BindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingStatus::Opened => "opened",
            BindingStatus::Loaded => "loaded",
            BindingStatus::Dispatched => "dispatched",
            BindingStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabBinding {
    pub page: PageHandle,
    pub destination: DestinationDescriptor,
    /// 该页面打开时使用的地址，多地址平台的每个页面各有一个。
    pub target_url: String,
    pub status: BindingStatus,
    /// 打开顺序，用于稳定的展示顺序。
    pub ordinal: usize,
    pub dispatch_count: u32,
    pub reload_count: u32,
    pub extra_config: Option<serde_json::Value>,
}

/// `mark_loaded` 的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTransition {
    Advanced,
    /// 已经处于 `Loaded` 或更后的状态，重复通知被忽略。
    AlreadyLoaded,
    /// 页面加载的不是预期地址，例如登录跳转。
    UrlMismatch,
    Unknown,
}

#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: HashMap<PageHandle, TabBinding>,
    next_ordinal: usize,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记新打开的页面。同一句柄已存在时返回 false。
    pub fn register(
        &mut self,
        page: PageHandle,
        destination: DestinationDescriptor,
        target_url: String,
        extra_config: Option<serde_json::Value>,
    ) -> bool {
        if self.bindings.contains_key(&page) {
            return false;
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.bindings.insert(
            page,
            TabBinding {
                page,
                destination,
                target_url,
                status: BindingStatus::Opened,
                ordinal,
                dispatch_count: 0,
                reload_count: 0,
                extra_config,
            },
        );
        true
    }

    pub fn mark_loaded(&mut self, page: PageHandle, loaded_url: Option<&str>) -> LoadTransition {
        let Some(binding) = self.bindings.get_mut(&page) else {
            return LoadTransition::Unknown;
        };

        if binding.status != BindingStatus::Opened {
            return LoadTransition::AlreadyLoaded;
        }

        match loaded_url {
            Some(url) if url_matches(&binding.target_url, url) => {
                binding.status = BindingStatus::Loaded;
                LoadTransition::Advanced
            }
            _ => LoadTransition::UrlMismatch,
        }
    }

    /// 将 `Loaded` 的绑定推进到 `Dispatched` 并返回其快照；其他状态返回 None。
    pub fn begin_dispatch(&mut self, page: PageHandle) -> Option<TabBinding> {
        let binding = self.bindings.get_mut(&page)?;
        if binding.status != BindingStatus::Loaded {
            return None;
        }

        binding.status = BindingStatus::Dispatched;
        binding.dispatch_count += 1;
        Some(binding.clone())
    }

    /// 重置为 `Opened`，返回需要重新导航的地址。
    pub fn reset_for_reload(&mut self, page: PageHandle) -> Option<String> {
        let binding = self.bindings.get_mut(&page)?;
        binding.status = BindingStatus::Opened;
        binding.reload_count += 1;
        Some(binding.target_url.clone())
    }

    pub fn remove(&mut self, page: PageHandle) -> Option<TabBinding> {
        let mut binding = self.bindings.remove(&page)?;
        binding.status = BindingStatus::Closed;
        Some(binding)
    }

    /// 移除全部绑定，按打开顺序返回。
    pub fn drain(&mut self) -> Vec<TabBinding> {
        let mut drained: Vec<TabBinding> = self
            .bindings
            .drain()
            .map(|(_, mut binding)| {
                binding.status = BindingStatus::Closed;
                binding
            })
            .collect();
        drained.sort_by_key(|binding| binding.ordinal);
        drained
    }

    pub fn get(&self, page: PageHandle) -> Option<&TabBinding> {
        self.bindings.get(&page)
    }

    pub fn contains(&self, page: PageHandle) -> bool {
        self.bindings.contains_key(&page)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// 按打开顺序排列的绑定。
    pub fn ordered(&self) -> Vec<&TabBinding> {
        let mut bindings: Vec<&TabBinding> = self.bindings.values().collect();
        bindings.sort_by_key(|binding| binding.ordinal);
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentCategory;
    use crate::platform::{Capability, DestinationDefinition};

    const URL: &str = "https://zhuanlan.zhihu.com/write";

    fn descriptor() -> DestinationDescriptor {
        DestinationDescriptor::from_definition(&DestinationDefinition::new(
            "ARTICLE_ZHIHU",
            ContentCategory::Article,
            URL,
            Capability::ArticleZhihu,
        ))
    }

    fn registry_with_page(page: PageHandle) -> BindingRegistry {
        let mut registry = BindingRegistry::new();
        assert!(registry.register(page, descriptor(), URL.into(), None));
        registry
    }

    #[test]
    fn rejects_second_binding_for_same_page() {
        let mut registry = registry_with_page(PageHandle(1));
        assert!(!registry.register(PageHandle(1), descriptor(), URL.into(), None));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn load_requires_expected_url_and_is_idempotent() {
        let page = PageHandle(1);
        let mut registry = registry_with_page(page);

        assert_eq!(
            registry.mark_loaded(page, Some("https://www.zhihu.com/signin")),
            LoadTransition::UrlMismatch
        );
        assert_eq!(registry.mark_loaded(page, None), LoadTransition::UrlMismatch);
        assert_eq!(
            registry.get(page).map(|binding| binding.status),
            Some(BindingStatus::Opened)
        );

        assert_eq!(registry.mark_loaded(page, Some(URL)), LoadTransition::Advanced);
        assert_eq!(
            registry.mark_loaded(page, Some(URL)),
            LoadTransition::AlreadyLoaded
        );
        assert_eq!(
            registry.mark_loaded(PageHandle(9), Some(URL)),
            LoadTransition::Unknown
        );
    }

    #[test]
    fn dispatch_happens_once_per_load() {
        let page = PageHandle(1);
        let mut registry = registry_with_page(page);

        assert!(registry.begin_dispatch(page).is_none());
        registry.mark_loaded(page, Some(URL));

        let dispatched = registry.begin_dispatch(page).expect("first dispatch");
        assert_eq!(dispatched.status, BindingStatus::Dispatched);
        assert_eq!(dispatched.dispatch_count, 1);
        assert!(registry.begin_dispatch(page).is_none());
        assert_eq!(
            registry.mark_loaded(page, Some(URL)),
            LoadTransition::AlreadyLoaded
        );

        assert_eq!(registry.reset_for_reload(page).as_deref(), Some(URL));
        assert_eq!(
            registry.get(page).map(|binding| binding.status),
            Some(BindingStatus::Opened)
        );
        registry.mark_loaded(page, Some(URL));
        let redispatched = registry.begin_dispatch(page).expect("second dispatch");
        assert_eq!(redispatched.dispatch_count, 2);
        assert_eq!(redispatched.reload_count, 1);
    }

    #[test]
    fn removal_works_from_any_status() {
        let mut registry = BindingRegistry::new();
        for id in 1..=3 {
            registry.register(PageHandle(id), descriptor(), URL.into(), None);
        }
        registry.mark_loaded(PageHandle(2), Some(URL));
        registry.mark_loaded(PageHandle(3), Some(URL));
        registry.begin_dispatch(PageHandle(3));

        for id in 1..=3 {
            let removed = registry.remove(PageHandle(id)).expect("binding present");
            assert_eq!(removed.status, BindingStatus::Closed);
            assert!(!registry.contains(PageHandle(id)));
        }
        assert!(registry.is_empty());
        assert!(registry.remove(PageHandle(1)).is_none());
    }

    #[test]
    fn drain_and_ordering_follow_open_order() {
        let mut registry = BindingRegistry::new();
        for id in [30, 10, 20] {
            registry.register(PageHandle(id), descriptor(), URL.into(), None);
        }

        let ordered: Vec<_> = registry.ordered().iter().map(|b| b.page.0).collect();
        assert_eq!(ordered, vec![30, 10, 20]);

        let drained: Vec<_> = registry.drain().iter().map(|b| b.page.0).collect();
        assert_eq!(drained, vec![30, 10, 20]);
        assert!(registry.is_empty());
    }
}
