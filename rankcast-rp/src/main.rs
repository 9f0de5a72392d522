//! rankcast-rp (Rank Predictor) - entry point
//!
//! Loads bootstrap configuration, opens the distribution store, optionally
//! warms the cache, and serves the HTTP API until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rankcast_common::config::{
    default_config_path, resolve_data_dir, StoreBackend, TomlConfig, DATA_DIR_ENV,
};
use rankcast_common::store::{open_store, DirectoryWatcher};
use rankcast_common::DistributionCache;
use rankcast_rp::api::buildinfo::BuildInfo;
use rankcast_rp::{build_router, AppState};

/// Command-line arguments for rankcast-rp
#[derive(Parser, Debug)]
#[command(name = "rankcast-rp")]
#[command(about = "Score-distribution rank predictor")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "RANKCAST_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory holding distribution artifacts
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Path to rankcast.toml
    #[arg(short, long, env = "RANKCAST_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before tracing starts so the configured level can seed the filter
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = TomlConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting rankcast Rank Predictor (rankcast-rp) {}", BuildInfo::CURRENT);
    if config_path.exists() {
        info!("Configuration: {}", config_path.display());
    } else {
        warn!("Config file {} not found, using defaults", config_path.display());
    }

    let data_dir = resolve_data_dir(args.data_dir.as_deref(), DATA_DIR_ENV, &config);
    info!("Data directory: {}", data_dir.display());

    let store = open_store(&config, &data_dir)
        .await
        .context("Failed to open distribution store")?;
    let cache = Arc::new(DistributionCache::new());
    let state = AppState::new(store, cache.clone(), config.max_upload_bytes);

    // Held for the life of the server
    let _watcher = if config.watch_data_dir && config.store == StoreBackend::File {
        match DirectoryWatcher::spawn(&data_dir, cache) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Data directory changes will not be noticed until invalidated: {}", e);
                None
            }
        }
    } else {
        None
    };

    if config.warm_on_startup {
        if let Err(e) = state.repository().warm().await {
            warn!("Cache warm-up failed, distributions will load on demand: {}", e);
        }
    }

    let app = build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let port = args.port.unwrap_or(config.port);
    let addr = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("rankcast-rp listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
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
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
