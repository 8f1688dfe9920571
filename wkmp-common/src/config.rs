//! Data-directory resolution shared across WKMP modules
//!
//! Priority order (highest first): command-line argument, environment
//! variable, OS-dependent compiled default. Individual modules layer their
//! own TOML config file on top of this before falling back to priority 3.

use std::path::PathBuf;

/// Resolve a module-local data directory following the standard priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str, subdir: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    default_data_dir(subdir)
}

/// Get the OS-dependent default data directory for the given module subdirectory.
fn default_data_dir(subdir: &str) -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("wkmp").join(subdir))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\wkmp").join(subdir))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("wkmp").join(subdir))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/wkmp").join(subdir))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("wkmp").join(subdir))
            .unwrap_or_else(|| PathBuf::from("/var/lib/wkmp").join(subdir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_wins_over_everything() {
        std::env::set_var("WKMP_TEST_DATA_DIR_PRECEDENCE", "/from/env");
        let resolved = resolve_data_dir(
            Some("/from/cli"),
            "WKMP_TEST_DATA_DIR_PRECEDENCE",
            "transcode-cache",
        );
        assert_eq!(resolved, PathBuf::from("/from/cli"));
        std::env::remove_var("WKMP_TEST_DATA_DIR_PRECEDENCE");
    }

    #[test]
    fn env_var_wins_over_default() {
        std::env::set_var("WKMP_TEST_DATA_DIR_ENV", "/from/env/only");
        let resolved = resolve_data_dir(None, "WKMP_TEST_DATA_DIR_ENV", "transcode-cache");
        assert_eq!(resolved, PathBuf::from("/from/env/only"));
        std::env::remove_var("WKMP_TEST_DATA_DIR_ENV");
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        std::env::remove_var("WKMP_TEST_DATA_DIR_UNSET");
        let resolved = resolve_data_dir(None, "WKMP_TEST_DATA_DIR_UNSET", "transcode-cache");
        assert!(resolved.ends_with("transcode-cache"));
    }
}
