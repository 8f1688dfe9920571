//! Request handlers: `/health` and the dispatcher's HTTP-facing
//! `/transcode` (spec §4.1, §6.2).

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Response};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::transcode::cache_file;
use crate::transcode::client::ClientAdapter;
use crate::transcode::fallback;
use crate::transcode::fingerprint::{InputParams, OutputFormat, OutputParams, RequestedOutputParams};
use crate::transcode::registry::{Dispatch, Dispatcher};

use super::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "module": "wkmp-ap",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.config.port,
    }))
}

/// Query parameters for `GET /transcode`. Duration and offset arrive in
/// milliseconds because the audio-metadata parser that owns a track's
/// true duration is an external collaborator (spec §1); this surface
/// just forwards what it already computed.
#[derive(Debug, Deserialize)]
pub struct TranscodeQuery {
    /// Canonical absolute path of the source track.
    pub path: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub offset_ms: u64,
    /// One of `mp3`, `opus-ogg`, `opus-mka`, `vorbis-ogg`, `vorbis-webm`.
    pub format: String,
    pub bitrate: u32,
    #[serde(default)]
    pub stream: Option<usize>,
    #[serde(default)]
    pub strip_metadata: bool,
}

/// GET /transcode — the dispatcher's entry point. Fingerprints the
/// request, attaches to or creates a session, or serves a cache hit
/// directly, then streams the result as the HTTP response body.
pub async fn transcode(
    State(state): State<AppState>,
    Query(query): Query<TranscodeQuery>,
    headers: HeaderMap,
) -> Result<Response<Body>> {
    let format = OutputFormat::from_str(&query.format)
        .map_err(|_| Error::InvalidOutputParams(format!("unknown format {:?}", query.format)))?;

    let input = InputParams {
        track_path: PathBuf::from(query.path),
        duration: Duration::from_millis(query.duration_ms),
        offset: Duration::from_millis(query.offset_ms),
    };
    let requested = RequestedOutputParams {
        format,
        bitrate: query.bitrate,
        stream: query.stream,
        strip_metadata: query.strip_metadata,
    };

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // Cloned up front: if dispatch falls back to non-caching transcode
    // (spec §4.1 step 7) we need both params again, and `dispatch`
    // consumes them.
    let input_for_fallback = input.clone();
    let requested_for_fallback = requested.clone();

    let dispatcher = Dispatcher::new(Arc::clone(&state.registry), Arc::clone(&state.config));
    match dispatcher.dispatch(input, requested).await? {
        Dispatch::CachedFile { path, mime_type } => {
            cache_file::serve_cached_file(path, mime_type, range_header.as_deref()).await
        }
        Dispatch::Live(session, client_shared) => {
            let wait_timeout = Duration::from_secs(state.config.client_wait_timeout_seconds);
            let adapter = ClientAdapter::new(session, client_shared, wait_timeout);
            Ok(adapter.into_response(range_header.as_deref()))
        }
        Dispatch::Fallback => {
            let output = OutputParams::snap(requested_for_fallback, &state.config.allowed_bitrates)?;
            fallback::stream_without_cache(&state.config.encoder_path, input_for_fallback, output).await
        }
    }
}
