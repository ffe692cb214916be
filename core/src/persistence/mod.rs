//! 本地持久化层：账号快照与平台配置的存储。

#[cfg(feature = "sqlite-persistence")]
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::platform::{MemoryOverlayStore, OverlayStore};

/// 按配置打开存储：指定了数据库路径时使用 SQLite，否则退回内存存储。
pub fn open_overlay_store(database: Option<&Path>) -> Result<Arc<dyn OverlayStore>> {
    match database {
        #[cfg(feature = "sqlite-persistence")]
        Some(path) => {
            let persistence =
                sqlite::SqlitePersistence::bootstrap(sqlite::SqliteConfig::file(path))?;
            info!(target: "persistence", path = %path.display(), "overlay store opened");
            Ok(Arc::new(sqlite::SqliteOverlayStore::new(persistence)))
        }
        #[cfg(not(feature = "sqlite-persistence"))]
        Some(path) => {
            tracing::warn!(
                target: "persistence",
                path = %path.display(),
                "sqlite persistence disabled at build time, using memory store"
            );
            Ok(Arc::new(MemoryOverlayStore::new()))
        }
        None => {
            info!(target: "persistence", "no database configured, using memory store");
            Ok(Arc::new(MemoryOverlayStore::new()))
        }
    }
}
