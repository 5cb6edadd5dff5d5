//! Sync server for the qac daily task log.
//!
//! This server:
//! - Accepts document snapshots from client devices on POST /sync
//! - Checks the shared password in the X-Sync-Password header
//! - Merges each snapshot into the single server document and persists it
//! - Keeps one backup of the document per calendar day

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use qac_sync_core::SyncCoordinator;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;

use config::Config;
use handlers::{
    backups_handler, data_handler, health_handler, index_handler, sync_handler, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let sync_config = config.sync_config();

    info!("Starting qac-sync-server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Host: {}", config.host);
    info!("  Port: {}", config.port);
    info!("  Data dir: {}", sync_config.data_dir.display());
    info!("  Backup dir: {}", sync_config.backup_dir.display());
    match sync_config.backup_retention {
        Some(keep) => info!("  Backup retention: {} days", keep),
        None => info!("  Backup retention: unlimited"),
    }
    info!(
        "  Protected field: {}.{}",
        sync_config.policy.settings_key, sync_config.policy.credential_field
    );

    // Unwritable storage directories are fatal at startup
    let coordinator = SyncCoordinator::open(&sync_config).await?;

    let state = AppState {
        coordinator: Arc::new(coordinator),
    };

    // Browser clients call from arbitrary origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/sync", post(sync_handler))
        .route("/data", get(data_handler))
        .route("/backups", get(backups_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, initiating shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
        info!("Received SIGTERM, initiating shutdown");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
