use crate::content::ContentCategory;

use super::{Capability, DestinationDefinition};

type BuiltinRow = (
    &'static str,
    ContentCategory,
    &'static str,
    Capability,
    &'static str,
);

const BUILTIN_DESTINATIONS: &[BuiltinRow] = &[
    (
        "DYNAMIC_X",
        ContentCategory::Post,
        "https://x.com/compose/post",
        Capability::DynamicX,
        "x",
    ),
    (
        "DYNAMIC_WEIBO",
        ContentCategory::Post,
        "https://weibo.com/",
        Capability::DynamicWeibo,
        "weibo",
    ),
    (
        "DYNAMIC_BILIBILI",
        ContentCategory::Post,
        "https://t.bilibili.com/",
        Capability::DynamicBilibili,
        "bilibili",
    ),
    (
        "DYNAMIC_XIAOHONGSHU",
        ContentCategory::Post,
        "https://creator.xiaohongshu.com/publish/publish",
        Capability::DynamicXiaohongshu,
        "xiaohongshu",
    ),
    (
        "DYNAMIC_THREADS",
        ContentCategory::Post,
        "https://www.threads.net/",
        Capability::DynamicThreads,
        "threads",
    ),
    (
        "DYNAMIC_BLUESKY",
        ContentCategory::Post,
        "https://bsky.app/",
        Capability::DynamicBluesky,
        "bluesky",
    ),
    (
        "DYNAMIC_REDDIT",
        ContentCategory::Post,
        "https://www.reddit.com/submit",
        Capability::DynamicReddit,
        "reddit",
    ),
    (
        "ARTICLE_ZHIHU",
        ContentCategory::Article,
        "https://zhuanlan.zhihu.com/write",
        Capability::ArticleZhihu,
        "zhihu",
    ),
    (
        "ARTICLE_JUEJIN",
        ContentCategory::Article,
        "https://juejin.cn/editor/drafts/new?v=2",
        Capability::ArticleJuejin,
        "juejin",
    ),
    (
        "ARTICLE_CSDN",
        ContentCategory::Article,
        "https://editor.csdn.net/md/",
        Capability::ArticleCsdn,
        "csdn",
    ),
    (
        "ARTICLE_WEIXIN",
        ContentCategory::Article,
        "https://mp.weixin.qq.com/",
        Capability::ArticleWeixin,
        "weixin",
    ),
    (
        "VIDEO_BILIBILI",
        ContentCategory::Video,
        "https://member.bilibili.com/platform/upload/video/frame",
        Capability::VideoBilibili,
        "bilibili",
    ),
    (
        "VIDEO_YOUTUBE",
        ContentCategory::Video,
        "https://studio.youtube.com/",
        Capability::VideoYoutube,
        "youtube",
    ),
    (
        "VIDEO_DOUYIN",
        ContentCategory::Video,
        "https://creator.douyin.com/creator-micro/content/upload",
        Capability::VideoDouyin,
        "douyin",
    ),
    (
        "PODCAST_XIMALAYA",
        ContentCategory::Audio,
        "https://studio.ximalaya.com/upload",
        Capability::PodcastXimalaya,
        "ximalaya",
    ),
    (
        "PODCAST_SPOTIFY",
        ContentCategory::Audio,
        "https://creators.spotify.com/pod/dashboard/episode/wizard",
        Capability::PodcastSpotify,
        "spotify",
    ),
    (
        "FILE_DISCORD",
        ContentCategory::FileShare,
        "https://discord.com/channels/@me",
        Capability::FileDiscord,
        "discord",
    ),
    (
        "FILE_TELEGRAM",
        ContentCategory::FileShare,
        "https://web.telegram.org/a/",
        Capability::FileTelegram,
        "telegram",
    ),
];

/// The compiled-in destination table.
pub fn builtin_definitions() -> Vec<DestinationDefinition> {
    BUILTIN_DESTINATIONS
        .iter()
        .map(|(identifier, category, url, capability, account_key)| {
            DestinationDefinition::new(*identifier, *category, *url, *capability)
                .with_account_key(*account_key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identifiers_and_capabilities_are_unique() {
        let definitions = builtin_definitions();
        let identifiers: HashSet<&str> = definitions
            .iter()
            .map(|definition| definition.identifier.as_str())
            .collect();
        let capabilities: HashSet<Capability> = definitions
            .iter()
            .map(|definition| definition.capability)
            .collect();

        assert_eq!(identifiers.len(), definitions.len());
        assert_eq!(capabilities.len(), definitions.len());
    }

    #[test]
    fn bilibili_destinations_share_account() {
        let definitions = builtin_definitions();
        let keys: Vec<_> = definitions
            .iter()
            .filter(|definition| definition.identifier.ends_with("_BILIBILI"))
            .map(|definition| definition.account_key.as_deref())
            .collect();
        assert_eq!(keys, vec![Some("bilibili"), Some("bilibili")]);
    }
}
