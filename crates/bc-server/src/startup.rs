//! Server startup utilities.

use bc_cache::ConnectionState;
use bc_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    __                     __
   / /_  _____      ___   / /___ ____
  / __ \/ ___/_____/ _ \ / / __ `/ _ \
 / /_/ / /__/_____/  __// / /_/ /  __/
/_.___/\___/      \___//_/\__, /\___/
                         /____/
    "#);
}

/// Prints server startup information.
pub fn print_startup_info(config: &AppConfig, store: ConnectionState) {
    let separator = "=".repeat(60);
    let addr = config.server.addr();
    info!("{}", separator);
    info!("REST API:  http://{}", addr);
    info!("Health:    http://{}/health", addr);
    if config.server.admin_token().is_some() {
        info!("Cache:     http://{}/api/v1/cache/status", addr);
    }
    info!("Store:     {} (prefix '{}')", store, config.cache.key_prefix);
    info!(
        "Quotas:    general {}/{}s, auth {}/{}s",
        config.rate_limit.general.max_attempts,
        config.rate_limit.general.window_secs,
        config.rate_limit.auth.max_attempts,
        config.rate_limit.auth.window_secs
    );
    info!("{}", separator);
}
