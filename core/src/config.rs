//! 服务配置。默认值适合桌面端，部署时可通过环境变量覆盖。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dirs_compat::data_dir;

const ENV_CACHE_DIR: &str = "MULTIPOST_CACHE_DIR";
const ENV_DB_PATH: &str = "MULTIPOST_DB_PATH";
const ENV_LOG_DIR: &str = "MULTIPOST_LOG_DIR";
const ENV_MAX_FETCHES: &str = "MULTIPOST_MAX_FETCHES";
const ENV_FETCH_TIMEOUT_MS: &str = "MULTIPOST_FETCH_TIMEOUT_MS";
const ENV_AUTO_CLOSE_SECS: &str = "MULTIPOST_AUTO_CLOSE_SECS";
const ENV_AUTO_CLOSE_PAGES: &str = "MULTIPOST_AUTO_CLOSE_PAGES";
const ENV_CACHE_RETENTION_HOURS: &str = "MULTIPOST_CACHE_RETENTION_HOURS";

/// 媒体转存配置。
#[derive(Debug, Clone)]
pub struct RehostConfig {
    /// 转存文件的根目录，每个会话占用一个子目录。
    pub cache_dir: PathBuf,
    /// 同时进行的下载数上限。
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
    pub max_file_bytes: u64,
}

impl Default for RehostConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_base_dir().join("cache"),
            max_concurrent_fetches: 4,
            fetch_timeout: Duration::from_secs(30),
            max_file_bytes: 512 * 1024 * 1024,
        }
    }
}

/// 自动关闭配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCloseConfig {
    /// 会话进入空闲状态后是否自动开始倒计时。
    pub enabled: bool,
    pub delay_secs: u64,
    /// 倒计时结束时是否关闭所有仍被跟踪的页面。
    pub close_pages: bool,
}

impl Default for AutoCloseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_secs: 60,
            close_pages: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// 设置后额外输出按天滚动的日志文件。
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// 未设置时使用内存存储，账号与平台配置不会跨进程保留。
    pub database: Option<PathBuf>,
    pub rehost: RehostConfig,
    pub auto_close: AutoCloseConfig,
    pub cache_retention: Duration,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database: None,
            rehost: RehostConfig::default(),
            auto_close: AutoCloseConfig::default(),
            cache_retention: Duration::from_secs(48 * 60 * 60),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = env_path(ENV_CACHE_DIR) {
            config.rehost.cache_dir = dir;
        }
        config.database = env_path(ENV_DB_PATH);
        config.logging.log_dir = env_path(ENV_LOG_DIR);

        if let Some(value) = env_number(ENV_MAX_FETCHES) {
            config.rehost.max_concurrent_fetches = (value as usize).max(1);
        }
        if let Some(value) = env_number(ENV_FETCH_TIMEOUT_MS) {
            config.rehost.fetch_timeout = Duration::from_millis(value);
        }
        if let Some(value) = env_number(ENV_AUTO_CLOSE_SECS) {
            config.auto_close.enabled = value > 0;
            config.auto_close.delay_secs = value;
        }
        if let Some(value) = env_flag(ENV_AUTO_CLOSE_PAGES) {
            config.auto_close.close_pages = value;
        }
        if let Some(value) = env_number(ENV_CACHE_RETENTION_HOURS) {
            config.cache_retention = Duration::from_secs(value.saturating_mul(60 * 60));
        }

        config
    }
}

fn default_base_dir() -> PathBuf {
    data_dir()
        .map(|dir| dir.join("MultiPost"))
        .unwrap_or_else(|| std::env::temp_dir().join("multipost"))
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn env_number(key: &str) -> Option<u64> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse::<u64>() {
        Ok(number) => Some(number),
        Err(err) => {
            warn!(target: "config", key, %value, %err, "ignoring invalid numeric setting");
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
