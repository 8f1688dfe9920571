//! Caching transcoder core (spec §2 SYSTEM OVERVIEW).
//!
//! `registry` holds the [`registry::Dispatcher`] and [`registry::SessionRegistry`];
//! `session` is the per-fingerprint coordination object; `encoder` wraps the
//! spawned ffmpeg child process; `client` is the per-HTTP-request adapter;
//! `cache_file` serves a completed cache hit directly; `fallback` is the
//! non-caching escape hatch of spec §4.1 step 7; `fingerprint` snaps output
//! parameters onto the bitrate ladder and computes the 64-bit cache key.

pub mod cache_file;
pub mod client;
pub mod encoder;
pub mod fallback;
pub mod fingerprint;
pub mod registry;
pub mod session;
