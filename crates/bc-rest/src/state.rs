//! Application state for Axum handlers.

use bc_cache::CacheService;
use bc_config::AppConfig;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(cache: CacheService, config: AppConfig) -> Self {
        Self {
            cache,
            config: Arc::new(config),
        }
    }
}
