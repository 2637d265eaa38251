//! safeguardd - The safeguard background service
//!
//! This is the main entry point for the safeguardd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - HTTP backend and credentials
//! - SOS controller, session engine and timer loop
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use safeguard_config::load_config_or_default;
use safeguard_core::Services;
use safeguard_gateway::ReportedLocation;
use safeguard_http::{FileCredentials, HttpBackend};
use safeguard_store::SqliteStore;
use safeguard_util::default_config_path;
use safeguardd::Service;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// safeguardd - SOS and scheduled-session safety service
#[derive(Parser, Debug)]
#[command(name = "safeguardd")]
#[command(about = "SOS alerts and scheduled location-sharing enforcement", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/safeguard/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set SAFEGUARD_SOCKET env var)
    #[arg(short, long, env = "SAFEGUARD_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set SAFEGUARD_DATA_DIR env var)
    #[arg(short, long, env = "SAFEGUARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Bearer token file override
    #[arg(short, long, env = "SAFEGUARD_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Resolves on SIGTERM, SIGINT or SIGHUP
async fn shutdown_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
        _ = sighup.recv() => info!("Received SIGHUP, shutting down gracefully"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "safeguardd starting");

    let settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let socket_path = args
        .socket
        .clone()
        .unwrap_or_else(|| settings.service.socket_path.clone());
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| settings.service.data_dir.clone());
    let token_file = args
        .token_file
        .clone()
        .unwrap_or_else(|| settings.api.token_file.clone());

    info!(
        config_path = %args.config.display(),
        backend = %settings.api.base_url,
        "Configuration loaded"
    );

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let db_path = data_dir.join("safeguardd.db");
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );
    info!(db_path = %db_path.display(), "Store initialized");

    let credentials = Arc::new(FileCredentials::new(&token_file));
    let backend = Arc::new(
        HttpBackend::new(
            settings.api.base_url.clone(),
            settings.api.request_timeout,
            credentials,
        )
        .context("Failed to create HTTP client")?
        .with_update_interval(settings.sessions.update_interval_seconds),
    );
    info!(token_file = %token_file.display(), "Backend client initialized");

    let location = ReportedLocation::new();
    let services = Services::new(
        backend.clone(),
        backend,
        Arc::new(location.clone()),
        store,
    );

    let service = Service::start(&settings, services, location, &socket_path).await?;
    info!(socket_path = %socket_path.display(), "IPC server started");

    service
        .run(async {
            if let Err(e) = shutdown_signal().await {
                tracing::error!(error = %e, "Signal handling unavailable");
                std::future::pending::<()>().await;
            }
        })
        .await
}
