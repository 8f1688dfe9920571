//! Configuration loading and management
//!
//! Loads bootstrap configuration from a TOML file with optional
//! command-line overrides. No database-backed settings layer — the
//! transcoding cache core only needs the handful of keys below (spec
//! §6.4: `cache-root`, `allowed-bitrates`, `encoder-path`,
//! `client-wait-timeout-seconds`), plus the HTTP listen port.
//!
//! `cache-root` is optional in the TOML file: when neither the CLI flag
//! nor the file supplies one, it falls back to
//! `wkmp_common::config::resolve_data_dir`'s CLI/env/OS-default chain,
//! the same way every other WKMP module resolves its data directory.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// The allowed-bitrate ladder, descending, highest rung first.
pub const DEFAULT_BITRATE_LADDER: [u32; 8] =
    [320_000, 256_000, 192_000, 160_000, 128_000, 96_000, 64_000, 32_000];

fn default_port() -> u16 {
    5721
}

fn default_encoder_path() -> String {
    "ffmpeg".to_string()
}

fn default_client_wait_timeout_seconds() -> u64 {
    60
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root directory for cache files. Optional: falls back to
    /// `wkmp_common::config::resolve_data_dir` when absent.
    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the encoder binary (resolved via $PATH if not absolute)
    #[serde(default = "default_encoder_path")]
    pub encoder_path: String,

    /// Override of the bitrate snapping ladder, descending order
    #[serde(default)]
    pub allowed_bitrates: Option<Vec<u32>>,

    /// Per-client safety timer, in seconds
    #[serde(default = "default_client_wait_timeout_seconds")]
    pub client_wait_timeout_seconds: u64,
}

/// Runtime configuration, after CLI overrides have been applied
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_root: PathBuf,
    pub port: u16,
    pub encoder_path: String,
    pub allowed_bitrates: Vec<u32>,
    pub client_wait_timeout_seconds: u64,
}

impl Config {
    /// Load configuration from a TOML file, applying command-line overrides.
    pub async fn load(
        config_path: &PathBuf,
        cache_root_override: Option<PathBuf>,
        port_override: Option<u16>,
        encoder_path_override: Option<String>,
        client_wait_timeout_override: Option<u64>,
    ) -> Result<Self> {
        let toml_str = tokio::fs::read_to_string(config_path)
            .await
            .map_err(|e| Error::Config(format!("failed to read config file: {e}")))?;

        let toml_config: TomlConfig = toml::from_str(&toml_str)
            .map_err(|e| Error::Config(format!("failed to parse TOML: {e}")))?;

        Self::from_toml(
            toml_config,
            cache_root_override,
            port_override,
            encoder_path_override,
            client_wait_timeout_override,
        )
    }

    fn from_toml(
        toml_config: TomlConfig,
        cache_root_override: Option<PathBuf>,
        port_override: Option<u16>,
        encoder_path_override: Option<String>,
        client_wait_timeout_override: Option<u64>,
    ) -> Result<Self> {
        let allowed_bitrates = toml_config
            .allowed_bitrates
            .unwrap_or_else(|| DEFAULT_BITRATE_LADDER.to_vec());
        if allowed_bitrates.is_empty() {
            return Err(Error::Config(
                "allowed-bitrates must not be empty".to_string(),
            ));
        }

        Ok(Config {
            cache_root: cache_root_override.or(toml_config.cache_root).unwrap_or_else(|| {
                wkmp_common::config::resolve_data_dir(None, "WKMP_AP_CACHE_ROOT", "transcode-cache")
            }),
            port: port_override.unwrap_or(toml_config.port),
            encoder_path: encoder_path_override.unwrap_or(toml_config.encoder_path),
            allowed_bitrates,
            client_wait_timeout_seconds: client_wait_timeout_override
                .unwrap_or(toml_config.client_wait_timeout_seconds),
        })
    }
}
