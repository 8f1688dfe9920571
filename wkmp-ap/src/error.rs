//! Error types for the audio player module
//!
//! One variant per failure domain, `#[from]` conversions at the I/O
//! boundary, a crate-wide [`Result`] alias — mirrors `wkmp-common::error`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

/// Main error type for the audio player
#[derive(Debug, Error)]
pub enum Error {
    /// IO errors from file or pipe operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors — fails loudly, per the dispatcher's
    /// "programmer error" handling of malformed output parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// The encoder child process could not be spawned at all
    #[error("failed to start encoder: {0}")]
    EncoderSpawn(std::io::Error),

    /// Output parameters that cannot be snapped/fingerprinted
    #[error("invalid output parameters: {0}")]
    InvalidOutputParams(String),

    /// Generic errors bubbled up from dependencies
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

/// No error crosses the HTTP boundary as a panic (spec §7): once headers
/// are written a handler only truncates the body, but up to that point
/// every `Error` still owes the client a response. `InvalidOutputParams`
/// is a programmer error in spec terms only until it crosses this
/// boundary — malformed bitrate/format query parameters are the caller's
/// mistake here, not ours, so they become `400`.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidOutputParams(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Io(_) | Error::EncoderSpawn(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
