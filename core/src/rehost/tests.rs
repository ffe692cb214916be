use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::Mutex;

use super::{RehostError, RehostOutcome, ResourceFetcher, ResourceRehoster};
use crate::config::RehostConfig;
use crate::content::{
    ArticleContent, ContentPayload, FileShareContent, PostContent, ResourceFile,
};

const COVER_URL: &str = "https://cdn.example.com/cover.png";
const INLINE_URL: &str = "https://cdn.example.com/inline.jpg";

#[derive(Default)]
struct StubFetcher {
    responses: Mutex<HashMap<String, Result<Bytes, RehostError>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl StubFetcher {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    async fn respond(&self, url: &str, response: Result<Bytes, RehostError>) {
        self.responses.lock().await.insert(url.to_string(), response);
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ResourceFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, RehostError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().await.push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .lock()
            .await
            .get(url)
            .cloned()
            .unwrap_or_else(|| Ok(Bytes::from(format!("bytes of {url}"))));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

fn rehoster(dir: &TempDir, fetcher: Arc<StubFetcher>, max_concurrent_fetches: usize) -> ResourceRehoster {
    let config = RehostConfig {
        cache_dir: dir.path().to_path_buf(),
        max_concurrent_fetches,
        fetch_timeout: Duration::from_secs(5),
        max_file_bytes: 1024,
    };
    ResourceRehoster::new(config, fetcher)
}

fn article() -> ContentPayload {
    ContentPayload::Article(ArticleContent {
        title: "Weekly".into(),
        digest: "digest".into(),
        cover: Some(ResourceFile::remote("cover.png", "image/png", COVER_URL)),
        html_content: format!(r#"<p>intro</p><img src="{INLINE_URL}"><a href="{INLINE_URL}">raw</a>"#),
        markdown_content: format!("intro\n\n![inline]({INLINE_URL})\n"),
        images: vec![ResourceFile::remote("inline.jpg", "image/jpeg", INLINE_URL)],
    })
}

fn as_article(payload: &ContentPayload) -> &ArticleContent {
    match payload {
        ContentPayload::Article(article) => article,
        other => panic!("expected article payload, got {other:?}"),
    }
}

#[tokio::test]
async fn rehosts_remote_files_and_rewrites_inline_images() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::default());
    let rehoster = rehoster(&dir, fetcher.clone(), 4);

    let report = rehoster.rehost("session-a", article()).await;

    assert!(report.error_messages().is_empty());
    assert_eq!(report.rehosted_count(), 2);

    let article = as_article(&report.payload);
    let cover = article.cover.as_ref().unwrap();
    assert!(cover.is_local());
    assert_eq!(cover.origin_location.as_deref(), Some(COVER_URL));
    assert_eq!(cover.byte_size, format!("bytes of {COVER_URL}").len() as u64);

    let stored_path = cover.current_location.trim_start_matches("file://");
    let stored = std::fs::read(stored_path).expect("rehosted cover exists");
    assert_eq!(stored, format!("bytes of {COVER_URL}").into_bytes());

    let inline = &article.images[0];
    assert!(inline.is_local());
    assert!(article
        .html_content
        .contains(&format!(r#"<img src="{}">"#, inline.current_location)));
    assert!(article
        .html_content
        .contains(&format!(r#"<a href="{INLINE_URL}">"#)));
    assert!(article
        .markdown_content
        .contains(&format!("![inline]({})", inline.current_location)));

    let mut calls = fetcher.calls().await;
    calls.sort();
    assert_eq!(calls, vec![COVER_URL.to_string(), INLINE_URL.to_string()]);
}

#[tokio::test]
async fn failed_cover_keeps_remote_location_and_reports_once() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::default());
    fetcher
        .respond(COVER_URL, Err(RehostError::HttpStatus(403)))
        .await;
    let rehoster = rehoster(&dir, fetcher, 4);

    let report = rehoster.rehost("session-b", article()).await;

    let errors = report.error_messages();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("cover.png"));
    assert!(errors[0].contains("403"));

    let article = as_article(&report.payload);
    let cover = article.cover.as_ref().unwrap();
    assert_eq!(cover.current_location, COVER_URL);
    assert!(cover.origin_location.is_none());
    assert!(article.images[0].is_local());
}

#[tokio::test]
async fn rehosting_twice_is_stable() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::default());
    let rehoster = rehoster(&dir, fetcher.clone(), 2);

    let first = rehoster.rehost("session-c", article()).await;
    let second = rehoster.rehost("session-c", first.payload.clone()).await;

    assert_eq!(second.payload, first.payload);
    assert!(second
        .files
        .iter()
        .all(|file| file.outcome == RehostOutcome::AlreadyLocal));
    assert_eq!(fetcher.calls().await.len(), 2);
}

#[tokio::test]
async fn identical_urls_are_fetched_once() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::default());
    let rehoster = rehoster(&dir, fetcher.clone(), 4);
    let payload = ContentPayload::ShortPost(PostContent {
        title: "dup".into(),
        content: String::new(),
        images: vec![
            ResourceFile::remote("a.png", "image/png", COVER_URL),
            ResourceFile::remote("b.png", "image/png", COVER_URL),
        ],
        videos: Vec::new(),
    });

    let report = rehoster.rehost("session-d", payload).await;

    assert_eq!(fetcher.calls().await, vec![COVER_URL.to_string()]);
    assert_eq!(report.rehosted_count(), 2);
    let locations: Vec<_> = report
        .payload
        .resources()
        .into_iter()
        .map(|file| file.current_location.clone())
        .collect();
    assert_eq!(locations[0], locations[1]);
}

#[tokio::test]
async fn downloads_run_concurrently_within_limit() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(30)));
    let rehoster = rehoster(&dir, fetcher.clone(), 2);
    let files = (0..6)
        .map(|index| {
            ResourceFile::remote(
                format!("part-{index}.zip"),
                "application/zip",
                format!("https://files.example.com/{index}.zip"),
            )
        })
        .collect();
    let payload = ContentPayload::FileShare(FileShareContent {
        title: "bundle".into(),
        content: String::new(),
        files,
    });

    let report = rehoster.rehost("session-e", payload).await;

    assert_eq!(report.rehosted_count(), 6);
    assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unsupported_and_oversized_files_fail_softly() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::default());
    fetcher
        .respond(INLINE_URL, Ok(Bytes::from(vec![0_u8; 4096])))
        .await;
    let rehoster = rehoster(&dir, fetcher.clone(), 4);
    let payload = ContentPayload::ShortPost(PostContent {
        title: "mixed".into(),
        content: String::new(),
        images: vec![
            ResourceFile::remote("ftp.png", "image/png", "ftp://example.com/a.png"),
            ResourceFile::remote("big.jpg", "image/jpeg", INLINE_URL),
        ],
        videos: Vec::new(),
    });

    let report = rehoster.rehost("session-f", payload).await;

    assert_eq!(report.failed_count(), 2);
    let errors = report.error_messages();
    assert!(errors[0].contains("ftp.png"));
    assert!(errors[1].contains("big.jpg"));
    assert_eq!(fetcher.calls().await, vec![INLINE_URL.to_string()]);
}

#[tokio::test]
async fn release_and_purge_remove_session_directories() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(StubFetcher::default());
    let rehoster = rehoster(&dir, fetcher, 4);

    rehoster.rehost("session-g", article()).await;
    rehoster.rehost("session-h", article()).await;
    assert!(rehoster.session_dir("session-g").exists());

    rehoster.release("session-g").await.unwrap();
    assert!(!rehoster.session_dir("session-g").exists());
    rehoster.release("session-g").await.unwrap();

    let purged = rehoster.purge_expired(Duration::ZERO).await.unwrap();
    assert_eq!(purged, 1);
    assert!(!rehoster.session_dir("session-h").exists());
}

#[tokio::test]
async fn warmup_creates_cache_root() {
    let dir = TempDir::new().unwrap();
    let config = RehostConfig {
        cache_dir: dir.path().join("nested").join("cache"),
        ..RehostConfig::default()
    };
    let rehoster = ResourceRehoster::new(config, Arc::new(StubFetcher::default()));

    let purged = rehoster.warmup(Duration::from_secs(3600)).await.unwrap();

    assert_eq!(purged, 0);
    assert!(rehoster.cache_dir().is_dir());
}
