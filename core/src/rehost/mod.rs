//! 媒体资源转存。
//!
//! 将发布内容引用的远程媒体下载到会话缓存目录，替换为不会过期的本地引用。单个文件失败不会中断
//! 整体流程：失败文件保留原始远程地址，失败原因以消息形式交给会话展示。

mod fetch;
mod inline;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::RehostConfig;
use crate::content::{ContentPayload, LOCAL_SCHEME};

pub use fetch::{HttpFetcher, RehostError, ResourceFetcher};

use self::inline::rewrite_inline_references;

pub(crate) const TARGET: &str = "resource_rehoster";

/// 单个文件的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RehostOutcome {
    Rehosted { location: String },
    AlreadyLocal,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRehost {
    pub name: String,
    /// 处理前的位置。
    pub source: String,
    pub outcome: RehostOutcome,
}

impl FileRehost {
    pub fn error_message(&self) -> Option<String> {
        match &self.outcome {
            RehostOutcome::Failed { reason } => Some(format!(
                "文件 {} 转存失败，将继续使用原始链接：{reason}",
                self.name
            )),
            _ => None,
        }
    }
}

/// 转存完成后的内容与逐文件结果。
#[derive(Debug, Clone)]
pub struct RehostReport {
    pub payload: ContentPayload,
    pub files: Vec<FileRehost>,
}

impl RehostReport {
    pub fn error_messages(&self) -> Vec<String> {
        self.files
            .iter()
            .filter_map(FileRehost::error_message)
            .collect()
    }

    pub fn rehosted_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, RehostOutcome::Rehosted { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, RehostOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&RehostOutcome) -> bool) -> usize {
        self.files
            .iter()
            .filter(|file| predicate(&file.outcome))
            .count()
    }
}

enum FilePlan {
    Local,
    Unsupported,
    Fetch(usize),
}

struct FetchJob {
    url: String,
    destination: PathBuf,
}

#[derive(Debug)]
struct StoredFile {
    location: String,
    byte_size: u64,
}

pub struct ResourceRehoster {
    config: RehostConfig,
    fetcher: Arc<dyn ResourceFetcher>,
}

impl std::fmt::Debug for ResourceRehoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRehoster")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceRehoster {
    pub fn new(mut config: RehostConfig, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        if config.cache_dir.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                config.cache_dir = cwd.join(&config.cache_dir);
            }
        }
        Self { config, fetcher }
    }

    pub fn with_http(config: RehostConfig) -> Self {
        let fetcher = HttpFetcher::new(config.fetch_timeout, config.max_file_bytes);
        Self::new(config, Arc::new(fetcher))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.config.cache_dir.join(session_id)
    }

    /// 转存内容中的全部远程媒体。总是返回成功，逐文件结果见报告。
    pub async fn rehost(&self, session_id: &str, mut payload: ContentPayload) -> RehostReport {
        let session_dir = self.session_dir(session_id);
        let mut plans = Vec::new();
        let mut jobs: Vec<FetchJob> = Vec::new();
        let mut job_by_url: HashMap<String, usize> = HashMap::new();

        for file in payload.resources() {
            let plan = if file.is_local() {
                FilePlan::Local
            } else if !file.is_remote() {
                FilePlan::Unsupported
            } else if let Some(index) = job_by_url.get(&file.current_location) {
                FilePlan::Fetch(*index)
            } else {
                let index = jobs.len();
                jobs.push(FetchJob {
                    url: file.current_location.clone(),
                    destination: session_dir.join(cache_file_name(index, &file.name)),
                });
                job_by_url.insert(file.current_location.clone(), index);
                FilePlan::Fetch(index)
            };
            plans.push(plan);
        }

        let results = self.run_jobs(&session_dir, jobs).await;

        let mut files = Vec::with_capacity(plans.len());
        let mut replacements: Vec<(String, String)> = Vec::new();

        for (file, plan) in payload.resources_mut().into_iter().zip(plans) {
            let source = file.current_location.clone();
            let outcome = match plan {
                FilePlan::Local => RehostOutcome::AlreadyLocal,
                FilePlan::Unsupported => RehostOutcome::Failed {
                    reason: RehostError::UnsupportedLocation(source.clone()).to_string(),
                },
                FilePlan::Fetch(index) => match &results[index] {
                    Ok(stored) => {
                        file.rehosted(stored.location.clone(), stored.byte_size);
                        if !replacements.iter().any(|(origin, _)| origin == &source) {
                            replacements.push((source.clone(), stored.location.clone()));
                        }
                        RehostOutcome::Rehosted {
                            location: stored.location.clone(),
                        }
                    }
                    Err(err) => RehostOutcome::Failed {
                        reason: err.to_string(),
                    },
                },
            };

            if let RehostOutcome::Failed { reason } = &outcome {
                warn!(
                    target: TARGET,
                    session_id,
                    file = %file.name,
                    location = %source,
                    %reason,
                    "resource rehost failed, keeping remote location"
                );
            }

            files.push(FileRehost {
                name: file.name.clone(),
                source,
                outcome,
            });
        }

        for body in payload.bodies_mut() {
            for (origin, location) in &replacements {
                *body = rewrite_inline_references(body, origin, location);
            }
        }

        let report = RehostReport { payload, files };
        info!(
            target: TARGET,
            session_id,
            total = report.files.len(),
            rehosted = report.rehosted_count(),
            failed = report.failed_count(),
            "resource rehost finished"
        );
        report
    }

    async fn run_jobs(
        &self,
        session_dir: &Path,
        jobs: Vec<FetchJob>,
    ) -> Vec<Result<StoredFile, RehostError>> {
        if jobs.is_empty() {
            return Vec::new();
        }

        if let Err(err) = tokio::fs::create_dir_all(session_dir).await {
            let error = RehostError::io(format!(
                "failed to create {}: {err}",
                session_dir.display()
            ));
            return jobs.iter().map(|_| Err(error.clone())).collect();
        }

        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_fetches.max(1)));
        let max_bytes = self.config.max_file_bytes;
        let mut tasks = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let result = match limiter.acquire_owned().await {
                    Ok(_permit) => fetch_and_store(fetcher.as_ref(), &job, max_bytes).await,
                    Err(_) => Err(RehostError::fetch("download limiter closed")),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<StoredFile, RehostError>>> =
            (0..tasks.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(err) => warn!(target: TARGET, %err, "resource download task aborted"),
            }
        }

        results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|| Err(RehostError::fetch("download task aborted")))
            })
            .collect()
    }

    /// 建立缓存根目录并清理过期缓存，返回清理的目录数。
    pub async fn warmup(&self, retention: Duration) -> std::io::Result<usize> {
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        self.purge_expired(retention).await
    }

    /// 删除会话的缓存目录。
    pub async fn release(&self, session_id: &str) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(self.session_dir(session_id)).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// 清理超过保留时长的会话缓存目录，返回删除的目录数。
    pub async fn purge_expired(&self, retention: Duration) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.config.cache_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }

            let expired = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map_or(false, |age| age >= retention);
            if !expired {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(
                    target: TARGET,
                    path = %entry.path().display(),
                    %err,
                    "failed to purge expired cache directory"
                ),
            }
        }

        Ok(removed)
    }
}

async fn fetch_and_store(
    fetcher: &dyn ResourceFetcher,
    job: &FetchJob,
    max_bytes: u64,
) -> Result<StoredFile, RehostError> {
    let bytes = fetcher.fetch(&job.url).await?;
    if bytes.len() as u64 > max_bytes {
        return Err(RehostError::TooLarge { limit: max_bytes });
    }

    let partial = partial_path(&job.destination);
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|err| RehostError::io(format!("{}: {err}", partial.display())))?;
    tokio::fs::rename(&partial, &job.destination)
        .await
        .map_err(|err| RehostError::io(format!("{}: {err}", job.destination.display())))?;

    Ok(StoredFile {
        location: local_reference(&job.destination),
        byte_size: bytes.len() as u64,
    })
}

fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.part"))
}

fn local_reference(path: &Path) -> String {
    format!("{LOCAL_SCHEME}{}", path.display())
}

fn cache_file_name(index: usize, name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('.');
    if sanitized.is_empty() {
        format!("{index:03}-resource")
    } else {
        format!("{index:03}-{sanitized}")
    }
}

#[cfg(test)]
mod tests;
