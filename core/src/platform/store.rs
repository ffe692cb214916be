use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

/// Key spaces of the overlay store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreNamespace {
    /// Account snapshots keyed by account key.
    Account,
    /// User configuration keyed by destination identifier.
    UserConfig,
}

impl StoreNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreNamespace::Account => "account",
            StoreNamespace::UserConfig => "user_config",
        }
    }
}

/// Key-value persistence for account and user-config overlays.
#[async_trait]
pub trait OverlayStore: Send + Sync {
    async fn get(&self, namespace: StoreNamespace, key: &str) -> Result<Option<Value>>;

    async fn set(&self, namespace: StoreNamespace, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, namespace: StoreNamespace, key: &str) -> Result<()>;
}

/// In-process store, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryOverlayStore {
    entries: Mutex<HashMap<(StoreNamespace, String), Value>>,
}

impl MemoryOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverlayStore for MemoryOverlayStore {
    async fn get(&self, namespace: StoreNamespace, key: &str) -> Result<Option<Value>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(namespace, key.to_string()))
            .cloned())
    }

    async fn set(&self, namespace: StoreNamespace, key: &str, value: Value) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert((namespace, key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, namespace: StoreNamespace, key: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .remove(&(namespace, key.to_string()));
        Ok(())
    }
}
