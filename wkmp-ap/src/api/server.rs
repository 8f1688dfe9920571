//! HTTP server bootstrap: binds the configured port and serves the
//! router of [`super::create_router`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::transcode::registry::SessionRegistry;

use super::{create_router, AppState};

/// Run the HTTP API server until it exits (normally only on bind/serve
/// failure or process shutdown).
pub async fn run(config: Arc<Config>, registry: Arc<SessionRegistry>) -> anyhow::Result<()> {
    let port = config.port;
    let state = AppState { config, registry };

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}
