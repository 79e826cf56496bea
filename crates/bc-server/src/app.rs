//! Application assembly.

use axum::Router;
use bc_cache::{CacheService, KeyValueStore, MemoryStore, RedisStore};
use bc_config::{AppConfig, RedisConfig};
use bc_core::BcResult;
use bc_rest::{create_router, AppState};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Opens the configured key-value store.
///
/// An unreachable Redis does not stop startup: the store comes back
/// disconnected, requests run uncached and unthrottled, and the store
/// keeps reconnecting in the background. Only an invalid configuration
/// is an error.
pub async fn open_store(config: &RedisConfig) -> BcResult<Arc<dyn KeyValueStore>> {
    if !config.enabled {
        warn!("Redis disabled; using the in-process store (not shared between instances)");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = RedisStore::new(config)?;
    match store.establish().await {
        Ok(()) => info!("Connected to Redis"),
        Err(e) => error!(error = %e, "Redis unreachable; serving without cache until it recovers"),
    }

    Ok(Arc::new(store))
}

/// Fully assembled application.
pub struct App {
    pub cache: CacheService,
    pub router: Router,
}

impl App {
    /// Opens the store and builds the router around `api`.
    pub async fn build(config: AppConfig, api: Router) -> BcResult<Self> {
        let store = open_store(&config.redis).await?;
        Ok(Self::with_store(config, store, api))
    }

    /// Builds the application on an already opened store.
    pub fn with_store(config: AppConfig, store: Arc<dyn KeyValueStore>, api: Router) -> Self {
        let cache = CacheService::new(store, &config.cache);
        let state = AppState::new(cache.clone(), config);
        let router = create_router(state, api);
        Self { cache, router }
    }
}
