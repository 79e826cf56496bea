//! # bc-server
//!
//! Runs the cache and rate-limit layer as a standalone HTTP server. The
//! API it fronts is empty here; embedders pass their own routes to
//! `bc_rest::create_router`.

use anyhow::Context;
use axum::Router;
use bc_cache::metrics::register_metrics;
use bc_config::ConfigLoader;
use bc_core::init_telemetry;
use bc_server::{app::App, startup};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let loader = ConfigLoader::from_default_location().context("loading configuration")?;
    let config = loader.get();

    init_telemetry(&config.observability.telemetry()).context("initializing logging")?;
    register_metrics();

    startup::print_banner();
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    let addr = config.server.addr();
    let app = App::build(config.clone(), Router::new()).await?;
    startup::print_startup_info(&config, app.cache.state());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Starting REST server on http://{}", addr);

    axum::serve(
        listener,
        app.router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("REST server error")?;

    app.cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
