//! # WKMP Audio Player (wkmp-ap) — caching transcoder core
//!
//! Turns on-demand audio-format conversion into a shared,
//! range-addressable byte stream: one `ffmpeg` child process satisfies
//! any number of concurrent HTTP clients requesting overlapping or
//! disjoint byte ranges of the same logical output, and a completed
//! transcode becomes a cache file served directly on every later
//! request for the same (input, output-parameters) combination.
//!
//! **Architecture:** [`transcode::registry::Dispatcher`] fingerprints each
//! request and either attaches it to a live [`transcode::session::Session`],
//! creates one, or hands back a cache-hit file handler; `api` wires that
//! onto an `axum` HTTP surface.

pub mod api;
pub mod config;
pub mod error;
pub mod transcode;

pub use error::{Error, Result};
