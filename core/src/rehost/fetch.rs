use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use super::TARGET;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RehostError {
    #[error("unsupported location: {0}")]
    UnsupportedLocation(String),
    #[error("download failed: {message}")]
    Fetch { message: String },
    #[error("received HTTP status {0}")]
    HttpStatus(u16),
    #[error("file exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("failed to store file: {message}")]
    Io { message: String },
}

impl RehostError {
    pub fn fetch<S: Into<String>>(message: S) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

/// Downloads the bytes behind a remote resource location.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, RehostError>;
}

/// HTTP fetcher backed by a blocking `ureq` agent.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Self {
        Self { timeout, max_bytes }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, RehostError> {
        let url = url.to_string();
        let timeout = self.timeout;
        let max_bytes = self.max_bytes;

        tokio::task::spawn_blocking(move || download(&url, timeout, max_bytes))
            .await
            .map_err(|err| RehostError::fetch(format!("download task failed: {err}")))?
    }
}

fn download(url: &str, timeout: Duration, max_bytes: u64) -> Result<Bytes, RehostError> {
    debug!(target: TARGET, %url, "downloading resource");

    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Err(RehostError::HttpStatus(code)),
        Err(err) => return Err(RehostError::fetch(err.to_string())),
    };

    if !(200..300).contains(&response.status()) {
        return Err(RehostError::HttpStatus(response.status()));
    }

    let mut buffer = Vec::new();
    response
        .into_reader()
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buffer)
        .map_err(|err| RehostError::fetch(format!("failed to read response body: {err}")))?;

    if buffer.len() as u64 > max_bytes {
        return Err(RehostError::TooLarge { limit: max_bytes });
    }

    Ok(Bytes::from(buffer))
}
