//! Destination descriptors and the registry that resolves them.
//!
//! A descriptor is the static, compiled-in definition of a destination merged with the
//! most recently saved account snapshot and the user's per-destination configuration.

mod builtin;
mod registry;
mod store;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::ContentCategory;

pub use builtin::builtin_definitions;
pub use registry::PlatformRegistry;
pub use store::{MemoryOverlayStore, OverlayStore, StoreNamespace};

/// Page-side automation routine bound to a destination.
///
/// The set is closed: every routine the page host can run is listed here and mapped to the
/// entry point it exposes inside the destination page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    DynamicX,
    DynamicWeibo,
    DynamicBilibili,
    DynamicXiaohongshu,
    DynamicThreads,
    DynamicBluesky,
    DynamicReddit,
    ArticleZhihu,
    ArticleJuejin,
    ArticleCsdn,
    ArticleWeixin,
    VideoBilibili,
    VideoYoutube,
    VideoDouyin,
    PodcastXimalaya,
    PodcastSpotify,
    FileDiscord,
    FileTelegram,
}

impl Capability {
    pub fn entry_point(&self) -> &'static str {
        match self {
            Capability::DynamicX => "DynamicX",
            Capability::DynamicWeibo => "DynamicWeibo",
            Capability::DynamicBilibili => "DynamicBilibili",
            Capability::DynamicXiaohongshu => "DynamicXiaohongshu",
            Capability::DynamicThreads => "DynamicThreads",
            Capability::DynamicBluesky => "DynamicBluesky",
            Capability::DynamicReddit => "DynamicReddit",
            Capability::ArticleZhihu => "ArticleZhihu",
            Capability::ArticleJuejin => "ArticleJuejin",
            Capability::ArticleCsdn => "ArticleCSDN",
            Capability::ArticleWeixin => "ArticleWeixin",
            Capability::VideoBilibili => "VideoBilibili",
            Capability::VideoYoutube => "VideoYoutube",
            Capability::VideoDouyin => "VideoDouyin",
            Capability::PodcastXimalaya => "PodcastXimalaya",
            Capability::PodcastSpotify => "PodcastSpotify",
            Capability::FileDiscord => "FileDiscord",
            Capability::FileTelegram => "FileTelegram",
        }
    }
}

/// Static definition compiled into the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationDefinition {
    pub identifier: String,
    pub category: ContentCategory,
    pub destination_url: String,
    pub capability: Capability,
    /// Key of the account snapshot shared by destinations of the same site.
    pub account_key: Option<String>,
}

impl DestinationDefinition {
    pub fn new<I, U>(
        identifier: I,
        category: ContentCategory,
        destination_url: U,
        capability: Capability,
    ) -> Self
    where
        I: Into<String>,
        U: Into<String>,
    {
        Self {
            identifier: identifier.into(),
            category,
            destination_url: destination_url.into(),
            capability,
            account_key: None,
        }
    }

    pub fn with_account_key<S: Into<String>>(mut self, key: S) -> Self {
        self.account_key = Some(key.into());
        self
    }
}

/// Where the pages of a destination are opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "urls", rename_all = "snake_case")]
pub enum DestinationTarget {
    Single(String),
    /// User configured override, one page per URL.
    Multiple(Vec<String>),
}

impl DestinationTarget {
    pub fn urls(&self) -> &[String] {
        match self {
            DestinationTarget::Single(url) => std::slice::from_ref(url),
            DestinationTarget::Multiple(urls) => urls,
        }
    }

    pub fn page_count(&self) -> usize {
        self.urls().len()
    }
}

/// Most recently refreshed account information for a site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub account_key: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub refreshed_at_ms: i64,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Per-destination settings chosen by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfigOverlay {
    /// Replaces the static destination URL when non-empty.
    #[serde(default)]
    pub custom_target_urls: Vec<String>,
    #[serde(default)]
    pub sub_community: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Fully resolved destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationDescriptor {
    pub identifier: String,
    pub category: ContentCategory,
    pub target: DestinationTarget,
    pub capability: Capability,
    #[serde(default)]
    pub account_key: Option<String>,
    #[serde(default)]
    pub account_overlay: Option<AccountSnapshot>,
    #[serde(default)]
    pub user_config: Option<UserConfigOverlay>,
}

impl DestinationDescriptor {
    pub(crate) fn from_definition(definition: &DestinationDefinition) -> Self {
        Self {
            identifier: definition.identifier.clone(),
            category: definition.category,
            target: DestinationTarget::Single(definition.destination_url.clone()),
            capability: definition.capability,
            account_key: definition.account_key.clone(),
            account_overlay: None,
            user_config: None,
        }
    }

    pub fn target_urls(&self) -> &[String] {
        self.target.urls()
    }

    pub(crate) fn apply_user_config(&mut self, overlay: UserConfigOverlay) {
        let custom: Vec<String> = overlay
            .custom_target_urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
        if !custom.is_empty() {
            self.target = DestinationTarget::Multiple(custom);
        }
        self.user_config = Some(overlay);
    }
}

/// Whether a page that finished loading `loaded` is showing the expected `expected` URL.
///
/// Both sides are parsed, so host case, default ports and percent-encoding follow the browser's
/// normalization. Fragments and trailing slashes are ignored; the loaded URL may extend the
/// expected one with a query string or a deeper path. An expected query must be kept as a prefix.
pub fn url_matches(expected: &str, loaded: &str) -> bool {
    let (Ok(expected), Ok(loaded)) = (Url::parse(expected.trim()), Url::parse(loaded.trim())) else {
        return false;
    };

    if expected.scheme() != loaded.scheme()
        || expected.host() != loaded.host()
        || expected.port_or_known_default() != loaded.port_or_known_default()
    {
        return false;
    }

    let expected_path = expected.path().trim_end_matches('/');
    let loaded_path = loaded.path().trim_end_matches('/');
    let expected_query = expected.query().filter(|query| !query.is_empty());

    if loaded_path == expected_path {
        return match expected_query {
            None => true,
            Some(query) => loaded.query().map_or(false, |loaded_query| {
                loaded_query == query
                    || loaded_query
                        .strip_prefix(query)
                        .map_or(false, |rest| rest.starts_with('&'))
            }),
        };
    }

    expected_query.is_none()
        && loaded_path
            .strip_prefix(expected_path)
            .map_or(false, |rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_matching_ignores_fragment_and_trailing_slash() {
        assert!(url_matches(
            "https://editor.csdn.net/md/",
            "https://editor.csdn.net/md"
        ));
        assert!(url_matches(
            "https://x.com/compose/post",
            "https://x.com/compose/post#draft"
        ));
        assert!(url_matches(
            "https://zhuanlan.zhihu.com/write",
            "https://zhuanlan.zhihu.com/write?source=multipost"
        ));
        assert!(url_matches(
            "https://juejin.cn/editor/drafts/new?v=2",
            "https://juejin.cn/editor/drafts/new?v=2"
        ));
    }

    #[test]
    fn url_matching_follows_browser_normalization() {
        assert!(url_matches(
            "https://www.Reddit.com/r/rust/submit",
            "https://www.reddit.com/r/rust/submit"
        ));
        assert!(url_matches(
            "https://mp.example.cn/写文章/中文",
            "https://mp.example.cn/%E5%86%99%E6%96%87%E7%AB%A0/%E4%B8%AD%E6%96%87"
        ));
        assert!(url_matches(
            "https://weibo.com:443/write",
            "https://weibo.com/write?from=home"
        ));
        assert!(!url_matches(
            "https://weibo.com:8443/write",
            "https://weibo.com/write"
        ));
        assert!(!url_matches(
            "http://weibo.com/write",
            "https://weibo.com/write"
        ));
    }

    #[test]
    fn expected_query_must_be_kept() {
        assert!(url_matches(
            "https://juejin.cn/editor/drafts/new?v=2",
            "https://juejin.cn/editor/drafts/new?v=2&from=home"
        ));
        assert!(!url_matches(
            "https://juejin.cn/editor/drafts/new?v=2",
            "https://juejin.cn/editor/drafts/new?v=3"
        ));
        assert!(!url_matches(
            "https://juejin.cn/editor/drafts/new?v=2",
            "https://juejin.cn/editor/drafts/new/extra?v=2"
        ));
    }

    #[test]
    fn url_matching_rejects_other_pages() {
        assert!(!url_matches(
            "https://x.com/compose/post",
            "https://x.com/login"
        ));
        assert!(!url_matches(
            "https://weibo.com/write",
            "https://weibo.com/writer"
        ));
        assert!(!url_matches("", "https://weibo.com"));
    }

    #[test]
    fn custom_urls_replace_single_target() {
        let definition = DestinationDefinition::new(
            "DYNAMIC_REDDIT",
            ContentCategory::Post,
            "https://www.reddit.com/submit",
            Capability::DynamicReddit,
        );
        let mut descriptor = DestinationDescriptor::from_definition(&definition);
        assert_eq!(descriptor.target.page_count(), 1);

        descriptor.apply_user_config(UserConfigOverlay {
            custom_target_urls: vec![
                "https://www.reddit.com/r/rust/submit".into(),
                "  ".into(),
                "https://www.reddit.com/r/programming/submit".into(),
            ],
            ..UserConfigOverlay::default()
        });

        assert_eq!(descriptor.target.page_count(), 2);
        assert!(matches!(descriptor.target, DestinationTarget::Multiple(_)));
    }

    #[test]
    fn empty_custom_urls_keep_static_target() {
        let definition = DestinationDefinition::new(
            "DYNAMIC_X",
            ContentCategory::Post,
            "https://x.com/compose/post",
            Capability::DynamicX,
        );
        let mut descriptor = DestinationDescriptor::from_definition(&definition);
        descriptor.apply_user_config(UserConfigOverlay {
            sub_community: Some("rustlang".into()),
            ..UserConfigOverlay::default()
        });

        assert_eq!(
            descriptor.target,
            DestinationTarget::Single("https://x.com/compose/post".into())
        );
        assert!(descriptor.user_config.is_some());
    }
}
