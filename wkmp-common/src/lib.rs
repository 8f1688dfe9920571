//! # WKMP Common Library
//!
//! Shared code across WKMP modules. With only `wkmp-ap` left in this
//! workspace, this crate carries what is genuinely module-agnostic:
//! - Common error type
//! - Bootstrap-path / data-directory resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
