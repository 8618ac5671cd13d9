//! Configuration file location
//!
//! `$CONTROLLED_PODS_CONFIG_DIR`, then `$XDG_CONFIG_HOME/controlled-pods`,
//! then the platform config directory reported by `directories`.

use std::path::PathBuf;

use directories::BaseDirs;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "CONTROLLED_PODS_CONFIG_DIR";

const APP_NAME: &str = "controlled-pods";

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    config_dir_from(|key| std::env::var(key).ok())
}

/// Resolve the configuration directory, reading variables through `lookup`
pub fn config_dir_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = lookup(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    lookup("XDG_CONFIG_HOME")
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(APP_NAME)
}

/// Get the configuration file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.yaml")
}
