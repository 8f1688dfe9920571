//! # WKMP Audio Player (wkmp-ap) — caching transcoder core
//!
//! **Purpose:** Serve transcoded/cached audio over HTTP with encoder
//! fan-out, partial-content serving, and durable cache reuse.
//!
//! **Architecture:** `axum` HTTP surface over a `tokio::process`-driven
//! caching transcoder (`wkmp_ap::transcode`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wkmp_ap::config::Config;
use wkmp_ap::transcode::registry::SessionRegistry;

#[derive(Parser, Debug)]
#[command(name = "wkmp-ap")]
#[command(about = "WKMP Audio Player - caching transcoder HTTP core")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "wkmp-ap.toml")]
    config: PathBuf,

    /// HTTP server port (overrides config file)
    #[arg(long)]
    port: Option<u16>,

    /// Cache root directory (overrides config file)
    #[arg(long)]
    cache_root: Option<PathBuf>,

    /// Encoder binary path (overrides config file)
    #[arg(long)]
    encoder_path: Option<String>,

    /// Per-client safety-timer duration, in seconds (overrides config file)
    #[arg(long)]
    client_wait_timeout_seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wkmp_ap=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    info!("Starting WKMP Audio Player (wkmp-ap)");

    let args = Args::parse();
    info!(config = ?args.config, "loading configuration");

    let config = Config::load(
        &args.config,
        args.cache_root,
        args.port,
        args.encoder_path,
        args.client_wait_timeout_seconds,
    )
    .await
    .context("failed to load configuration")?;
    info!(
        cache_root = %config.cache_root.display(),
        port = config.port,
        encoder_path = %config.encoder_path,
        "configuration loaded"
    );

    let registry = SessionRegistry::new();

    wkmp_ap::api::server::run(Arc::new(config), registry)
        .await
        .context("API server error")?;

    info!("WKMP Audio Player shutting down");
    Ok(())
}
