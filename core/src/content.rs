//! 发布内容的数据模型。
//!
//! 一次发布请求只携带一种内容形态，形态决定了可投递的平台类别以及需要转存的媒体文件。

use serde::{Deserialize, Serialize};

use crate::session::PublishError;

/// 本地文件引用使用的 scheme。
pub const LOCAL_SCHEME: &str = "file://";

/// 内容类别，同时也是平台的分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Post,
    Article,
    Video,
    Audio,
    FileShare,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Post => "post",
            ContentCategory::Article => "article",
            ContentCategory::Video => "video",
            ContentCategory::Audio => "audio",
            ContentCategory::FileShare => "file_share",
        }
    }
}

/// 单个媒体文件的引用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    pub name: String,
    pub mime_type: String,
    pub byte_size: u64,
    /// 当前可用的位置，远程 URL 或转存后的本地引用。
    pub current_location: String,
    /// 首次转存前的远程 URL，只写入一次。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_location: Option<String>,
}

impl ResourceFile {
    pub fn remote<N, M, U>(name: N, mime_type: M, url: U) -> Self
    where
        N: Into<String>,
        M: Into<String>,
        U: Into<String>,
    {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            byte_size: 0,
            current_location: url.into(),
            origin_location: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.current_location.starts_with(LOCAL_SCHEME)
    }

    pub fn is_remote(&self) -> bool {
        let location = self.current_location.to_ascii_lowercase();
        location.starts_with("http://") || location.starts_with("https://")
    }

    /// 转存成功后切换到本地引用，保留最初的远程地址。
    pub(crate) fn rehosted(&mut self, location: String, byte_size: u64) {
        if self.origin_location.is_none() {
            self.origin_location = Some(std::mem::replace(&mut self.current_location, location));
        } else {
            self.current_location = location;
        }
        self.byte_size = byte_size;
    }
}

/// 动态（短内容）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostContent {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<ResourceFile>,
    #[serde(default)]
    pub videos: Vec<ResourceFile>,
}

/// 长文。正文同时保留 HTML 与 Markdown 两种形态，各平台按需取用。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleContent {
    pub title: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub cover: Option<ResourceFile>,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub markdown_content: String,
    /// 正文内联图片。
    #[serde(default)]
    pub images: Vec<ResourceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoContent {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub video: ResourceFile,
    #[serde(default)]
    pub cover: Option<ResourceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContent {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub audio: ResourceFile,
    #[serde(default)]
    pub cover: Option<ResourceFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShareContent {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub files: Vec<ResourceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ContentPayload {
    ShortPost(PostContent),
    Article(ArticleContent),
    Video(VideoContent),
    Audio(AudioContent),
    FileShare(FileShareContent),
}

impl ContentPayload {
    pub fn category(&self) -> ContentCategory {
        match self {
            ContentPayload::ShortPost(_) => ContentCategory::Post,
            ContentPayload::Article(_) => ContentCategory::Article,
            ContentPayload::Video(_) => ContentCategory::Video,
            ContentPayload::Audio(_) => ContentCategory::Audio,
            ContentPayload::FileShare(_) => ContentCategory::FileShare,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ContentPayload::ShortPost(post) => &post.title,
            ContentPayload::Article(article) => &article.title,
            ContentPayload::Video(video) => &video.title,
            ContentPayload::Audio(audio) => &audio.title,
            ContentPayload::FileShare(share) => &share.title,
        }
    }

    /// 所有可达的媒体文件，按封面、主体、附件的顺序排列。
    pub fn resources(&self) -> Vec<&ResourceFile> {
        match self {
            ContentPayload::ShortPost(post) => post.images.iter().chain(&post.videos).collect(),
            ContentPayload::Article(article) => {
                article.cover.iter().chain(&article.images).collect()
            }
            ContentPayload::Video(video) => std::iter::once(&video.video)
                .chain(video.cover.as_ref())
                .collect(),
            ContentPayload::Audio(audio) => std::iter::once(&audio.audio)
                .chain(audio.cover.as_ref())
                .collect(),
            ContentPayload::FileShare(share) => share.files.iter().collect(),
        }
    }

    pub(crate) fn resources_mut(&mut self) -> Vec<&mut ResourceFile> {
        match self {
            ContentPayload::ShortPost(post) => {
                post.images.iter_mut().chain(post.videos.iter_mut()).collect()
            }
            ContentPayload::Article(article) => article
                .cover
                .iter_mut()
                .chain(article.images.iter_mut())
                .collect(),
            ContentPayload::Video(video) => std::iter::once(&mut video.video)
                .chain(video.cover.as_mut())
                .collect(),
            ContentPayload::Audio(audio) => std::iter::once(&mut audio.audio)
                .chain(audio.cover.as_mut())
                .collect(),
            ContentPayload::FileShare(share) => share.files.iter_mut().collect(),
        }
    }

    /// 可能内联引用图片的富文本正文。
    pub(crate) fn bodies_mut(&mut self) -> Vec<&mut String> {
        match self {
            ContentPayload::ShortPost(post) => vec![&mut post.content],
            ContentPayload::Article(article) => {
                vec![&mut article.html_content, &mut article.markdown_content]
            }
            ContentPayload::Video(_) | ContentPayload::Audio(_) | ContentPayload::FileShare(_) => {
                Vec::new()
            }
        }
    }
}

/// 用户选择的发布目标。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSelection {
    pub identifier: String,
    /// 原样透传给平台自动化脚本的附加配置。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_config: Option<serde_json::Value>,
}

impl DestinationSelection {
    pub fn new<S: Into<String>>(identifier: S) -> Self {
        Self {
            identifier: identifier.into(),
            extra_config: None,
        }
    }
}

/// 一次用户发起的发布动作。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub targets: Vec<DestinationSelection>,
    pub payload: ContentPayload,
    /// 为 false 时只填充页面，由用户手动确认提交。
    #[serde(default)]
    pub auto_submit: bool,
}

impl PublishRequest {
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.targets.is_empty() {
            return Err(PublishError::EmptyTargets);
        }

        let mut seen = std::collections::HashSet::with_capacity(self.targets.len());
        for target in &self.targets {
            if !seen.insert(target.identifier.as_str()) {
                return Err(PublishError::DuplicateTarget {
                    identifier: target.identifier.clone(),
                });
            }
        }

        Ok(())
    }
}
