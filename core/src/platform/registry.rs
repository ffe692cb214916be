use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::content::ContentCategory;

use super::builtin::builtin_definitions;
use super::store::{OverlayStore, StoreNamespace};
use super::{AccountSnapshot, DestinationDefinition, DestinationDescriptor, UserConfigOverlay};

const TARGET: &str = "platform_registry";

/// Resolves destination identifiers to descriptors.
///
/// Resolution layers the saved account snapshot and the user configuration on top of a copy
/// of the static definition; neither overlay is ever written back into the definition table.
pub struct PlatformRegistry {
    definitions: Vec<DestinationDefinition>,
    index: HashMap<String, usize>,
    store: Arc<dyn OverlayStore>,
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("definitions", &self.definitions.len())
            .finish_non_exhaustive()
    }
}

impl PlatformRegistry {
    pub fn new(definitions: Vec<DestinationDefinition>, store: Arc<dyn OverlayStore>) -> Self {
        let mut unique = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            if index.contains_key(&definition.identifier) {
                warn!(
                    target: TARGET,
                    identifier = %definition.identifier,
                    "duplicate destination definition ignored"
                );
                continue;
            }
            index.insert(definition.identifier.clone(), unique.len());
            unique.push(definition);
        }

        Self {
            definitions: unique,
            index,
            store,
        }
    }

    pub fn builtin(store: Arc<dyn OverlayStore>) -> Self {
        Self::new(builtin_definitions(), store)
    }

    pub fn definitions(&self) -> &[DestinationDefinition] {
        &self.definitions
    }

    pub async fn resolve(&self, identifier: &str) -> Option<DestinationDescriptor> {
        let definition = self.definitions.get(*self.index.get(identifier)?)?;
        Some(self.merge_overlays(definition).await)
    }

    /// Resolves every definition, optionally restricted to one category.
    pub async fn resolve_all(&self, category: Option<ContentCategory>) -> Vec<DestinationDescriptor> {
        let mut resolved = Vec::new();
        for definition in &self.definitions {
            if category.map_or(true, |category| definition.category == category) {
                resolved.push(self.merge_overlays(definition).await);
            }
        }
        resolved
    }

    pub async fn save_account(&self, snapshot: &AccountSnapshot) -> Result<()> {
        let value = serde_json::to_value(snapshot).context("failed to encode account snapshot")?;
        self.store
            .set(StoreNamespace::Account, &snapshot.account_key, value)
            .await
    }

    pub async fn save_user_config(&self, identifier: &str, overlay: &UserConfigOverlay) -> Result<()> {
        let value = serde_json::to_value(overlay).context("failed to encode user config")?;
        self.store
            .set(StoreNamespace::UserConfig, identifier, value)
            .await
    }

    pub async fn clear_user_config(&self, identifier: &str) -> Result<()> {
        self.store
            .remove(StoreNamespace::UserConfig, identifier)
            .await
    }

    async fn merge_overlays(&self, definition: &DestinationDefinition) -> DestinationDescriptor {
        let mut descriptor = DestinationDescriptor::from_definition(definition);

        if let Some(key) = definition.account_key.as_deref() {
            descriptor.account_overlay = self
                .load_overlay::<AccountSnapshot>(StoreNamespace::Account, key)
                .await;
        }

        if let Some(overlay) = self
            .load_overlay::<UserConfigOverlay>(StoreNamespace::UserConfig, &definition.identifier)
            .await
        {
            descriptor.apply_user_config(overlay);
        }

        debug!(
            target: TARGET,
            identifier = %descriptor.identifier,
            pages = descriptor.target.page_count(),
            has_account = descriptor.account_overlay.is_some(),
            "destination resolved"
        );

        descriptor
    }

    async fn load_overlay<T: DeserializeOwned>(
        &self,
        namespace: StoreNamespace,
        key: &str,
    ) -> Option<T> {
        let value = match self.store.get(namespace, key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                warn!(
                    target: TARGET,
                    namespace = namespace.as_str(),
                    key,
                    error = %err,
                    "failed to read overlay, using static definition"
                );
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(overlay) => Some(overlay),
            Err(err) => {
                warn!(
                    target: TARGET,
                    namespace = namespace.as_str(),
                    key,
                    %err,
                    "ignoring malformed overlay"
                );
                None
            }
        }
    }
}
