//! HTTP surface for the caching transcoder (spec §6.2).
//!
//! Two routes: `/health` and `/transcode`, the latter being the
//! dispatcher's entry point (spec §4.1). Route/playback/queue/device
//! management belongs to the rest of the music application and is out of
//! this crate's scope (spec §1).

pub mod handlers;
pub mod server;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::config::Config;
use crate::transcode::registry::SessionRegistry;

/// Application state shared across handlers: the process-wide session
/// registry and the resolved configuration.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/transcode", get(handlers::transcode))
        .with_state(state)
}
