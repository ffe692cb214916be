use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value as JsonValue;

use crate::platform::{OverlayStore, StoreNamespace};

/// Storage location of the overlay database.
#[derive(Debug, Clone)]
pub enum SqlitePath {
    File(PathBuf),
    Memory,
}

impl SqlitePath {
    fn to_manager(&self) -> SqliteConnectionManager {
        match self {
            SqlitePath::File(path) => {
                SqliteConnectionManager::file(path).with_flags(Self::open_flags())
            }
            SqlitePath::Memory => SqliteConnectionManager::memory().with_flags(Self::open_flags()),
        }
    }

    fn open_flags() -> OpenFlags {
        OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX
    }

    fn as_path(&self) -> Option<&Path> {
        match self {
            SqlitePath::File(path) => Some(path.as_path()),
            SqlitePath::Memory => None,
        }
    }
}

/// Configuration required to bootstrap SQLite persistence.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub path: SqlitePath,
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: SqlitePath::File(path.into()),
            pool_size: 4,
            busy_timeout: Duration::from_millis(250),
        }
    }

    /// Every pooled in-memory connection opens its own database, so the pool holds one.
    pub fn memory() -> Self {
        Self {
            path: SqlitePath::Memory,
            pool_size: 1,
            busy_timeout: Duration::from_millis(250),
        }
    }
}

/// A stored overlay row.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRecord {
    pub key: String,
    pub value: JsonValue,
    pub updated_at_ms: i64,
}

/// Handle that manages SQLite backed persistence.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: Pool<SqliteConnectionManager>,
    db_path: Option<PathBuf>,
}

impl std::fmt::Debug for SqlitePersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePersistence")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqlitePersistence {
    /// Bootstraps a connection pool and runs the database migrations.
    pub fn bootstrap(config: SqliteConfig) -> Result<Self> {
        if let Some(parent) = config.path.as_path().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let busy_timeout = config.busy_timeout;
        let manager = config
            .path
            .to_manager()
            .with_init(move |conn| Self::configure_connection(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .context("failed to create SQLite connection pool")?;

        {
            let mut conn = pool
                .get()
                .context("failed to acquire SQLite bootstrap connection")?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            db_path: config.path.as_path().map(Path::to_path_buf),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Provides access to a pooled connection for custom commands.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|err| anyhow!("failed to obtain SQLite connection: {err}"))
    }

    fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        Ok(())
    }

    fn run_migrations(conn: &mut Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS overlays (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS overlays_updated_idx
                ON overlays(namespace, updated_at_ms);
            "#,
        )
        .context("failed to run SQLite migrations")?;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn run_migrations_for_tests(conn: &mut Connection) -> Result<()> {
        Self::run_migrations(conn)
    }

    pub fn get_overlay(&self, namespace: StoreNamespace, key: &str) -> Result<Option<JsonValue>> {
        let conn = self.connection()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM overlays WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to load {} overlay {key}", namespace.as_str()))?;

        raw.map(|value| {
            serde_json::from_str(&value)
                .with_context(|| format!("corrupt {} overlay {key}", namespace.as_str()))
        })
        .transpose()
    }

    pub fn put_overlay(&self, namespace: StoreNamespace, key: &str, value: &JsonValue) -> Result<()> {
        let encoded = serde_json::to_string(value).context("failed to serialize overlay")?;
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO overlays (namespace, key, value, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at_ms = excluded.updated_at_ms",
            params![namespace.as_str(), key, encoded, Utc::now().timestamp_millis()],
        )
        .with_context(|| format!("failed to save {} overlay {key}", namespace.as_str()))?;
        Ok(())
    }

    pub fn delete_overlay(&self, namespace: StoreNamespace, key: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn
            .execute(
                "DELETE FROM overlays WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
            )
            .with_context(|| format!("failed to delete {} overlay {key}", namespace.as_str()))?;
        Ok(removed > 0)
    }

    /// Lists every overlay of a namespace, most recently updated first.
    pub fn list_overlays(&self, namespace: StoreNamespace) -> Result<Vec<OverlayRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT key, value, updated_at_ms FROM overlays
                 WHERE namespace = ?1
                 ORDER BY updated_at_ms DESC, key ASC",
            )
            .context("failed to prepare overlay listing")?;

        let rows = stmt
            .query_map(params![namespace.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .context("failed to list overlays")?;

        let mut records = Vec::new();
        for row in rows {
            let (key, raw, updated_at_ms) = row.context("failed to read overlay row")?;
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("corrupt {} overlay {key}", namespace.as_str()))?;
            records.push(OverlayRecord {
                key,
                value,
                updated_at_ms,
            });
        }
        Ok(records)
    }
}

/// [`OverlayStore`] backed by [`SqlitePersistence`]; queries run on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteOverlayStore {
    persistence: Arc<SqlitePersistence>,
}

impl SqliteOverlayStore {
    pub fn new(persistence: SqlitePersistence) -> Self {
        Self {
            persistence: Arc::new(persistence),
        }
    }

    pub fn persistence(&self) -> &SqlitePersistence {
        &self.persistence
    }

    async fn blocking<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqlitePersistence) -> Result<T> + Send + 'static,
    {
        let persistence = Arc::clone(&self.persistence);
        tokio::task::spawn_blocking(move || task(&persistence))
            .await
            .context("overlay store task panicked")?
    }
}

#[async_trait]
impl OverlayStore for SqliteOverlayStore {
    async fn get(&self, namespace: StoreNamespace, key: &str) -> Result<Option<JsonValue>> {
        let key = key.to_string();
        self.blocking(move |persistence| persistence.get_overlay(namespace, &key))
            .await
    }

    async fn set(&self, namespace: StoreNamespace, key: &str, value: JsonValue) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |persistence| persistence.put_overlay(namespace, &key, &value))
            .await
    }

    async fn remove(&self, namespace: StoreNamespace, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |persistence| persistence.delete_overlay(namespace, &key).map(|_| ()))
            .await
    }
}
