use anyhow::Result;
use tracing::info;

use multipost_core::config::ServiceConfig;
use multipost_core::persistence::open_overlay_store;
use multipost_core::platform::PlatformRegistry;
use multipost_core::rehost::ResourceRehoster;
use multipost_core::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::from_env();
    let _guard = init_tracing(&config.logging);

    let store = open_overlay_store(config.database.as_deref())?;
    let registry = PlatformRegistry::builtin(store);
    for descriptor in registry.resolve_all(None).await {
        info!(
            target: "multipost",
            identifier = %descriptor.identifier,
            category = descriptor.category.as_str(),
            pages = descriptor.target.page_count(),
            has_account = descriptor.account_overlay.is_some(),
            "destination available"
        );
    }

    let rehoster = ResourceRehoster::with_http(config.rehost.clone());
    let purged = rehoster.warmup(config.cache_retention).await?;
    info!(
        target: "multipost",
        cache_dir = %rehoster.cache_dir().display(),
        purged,
        "warmup finished"
    );

    Ok(())
}
