//! Download Manager (sdm-engine) - Main entry point
//!
//! Segmented HTTP download service: REST API + SSE on top of the transfer
//! engine, with SQLite persistence.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sdm_engine::api;
use sdm_engine::config::Config;
use sdm_engine::db;
use sdm_engine::state::{spawn_stats_collector, SharedState};
use sdm_engine::transfer::DownloadEngine;

/// Command-line arguments for sdm-engine
#[derive(Parser, Debug)]
#[command(name = "sdm-engine")]
#[command(about = "Segmented download manager service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "SDM_PORT")]
    port: u16,

    /// Data directory (database, default download folders)
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sdm_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = Config {
        port: args.port,
        data_dir: sdm_common::config::resolve_data_dir(
            args.data_dir.as_deref(),
            "SDM_DATA_DIR",
        ),
    };

    info!("Starting SDM download manager on port {}", config.port);
    info!("Data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir).context("Failed to create data directory")?;

    // Database
    let pool = db::connect(&config.db_path())
        .await
        .context("Failed to open database")?;
    db::init::init_schema(&pool)
        .await
        .context("Failed to initialize database schema")?;
    db::init::init_settings_defaults(&pool, &config.data_dir)
        .await
        .context("Failed to initialize default settings")?;

    // download directories exist before the first transfer
    let download_dir = db::settings::get_download_dir(&pool)
        .await
        .context("Failed to read download directory setting")?;
    let incomplete_dir = db::settings::get_incomplete_dir(&pool)
        .await
        .context("Failed to read incomplete directory setting")?;
    std::fs::create_dir_all(&download_dir).context("Failed to create download directory")?;
    std::fs::create_dir_all(&incomplete_dir).context("Failed to create incomplete directory")?;

    // Shared state + statistics
    let state = Arc::new(SharedState::new());
    spawn_stats_collector(Arc::clone(&state));

    // Transfer engine
    let engine = Arc::new(
        DownloadEngine::new(pool.clone(), Arc::clone(&state))
            .await
            .context("Failed to initialize download engine")?,
    );
    info!("Download engine initialized");

    // Build the application router
    let app_state = api::AppState {
        engine,
        db: pool,
        state,
        port: config.port,
    };
    let app = api::create_router(app_state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
