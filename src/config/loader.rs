//! Configuration loading and merging logic
//!
//! Precedence order (highest to lowest):
//! 1. Command line flags (applied by the caller)
//! 2. Environment variable overrides
//! 3. Configuration file
//! 4. Built-in defaults

use std::path::Path;

use anyhow::{Context, Result};

use super::{paths, schema::Config};

/// Namespace override; empty, `all` or `-A` means all namespaces
pub const NAMESPACE_ENV: &str = "CONTROLLED_PODS_NAMESPACE";

/// Sync timeout override, in seconds
pub const SYNC_TIMEOUT_ENV: &str = "CONTROLLED_PODS_SYNC_TIMEOUT";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged.
    ///
    /// An explicitly given `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = Config::default();

        match path {
            Some(path) => {
                config = Self::load_file(path)?;
            }
            None => {
                let default_path = paths::config_file_path();
                if default_path.exists() {
                    config = Self::load_file(&default_path)?;
                }
            }
        }

        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok())?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply environment variable overrides, reading variables through `lookup`
    pub fn apply_env_overrides(
        mut config: Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Config> {
        if let Some(namespace) = lookup(NAMESPACE_ENV) {
            config.namespace = parse_namespace(&namespace);
        }

        if let Some(timeout) = lookup(SYNC_TIMEOUT_ENV) {
            config.sync_timeout_secs = timeout.trim().parse().with_context(|| {
                format!("{} must be a number of seconds, got {:?}", SYNC_TIMEOUT_ENV, timeout)
            })?;
        }

        Ok(config)
    }

    /// Check values that parse but cannot work
    pub fn validate(config: &Config) -> Result<()> {
        if config.sync_timeout_secs == 0 {
            return Err(anyhow::anyhow!("syncTimeoutSecs must be greater than 0"));
        }
        if config
            .label_selector
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err(anyhow::anyhow!("labelSelector must not be empty when set"));
        }
        config
            .controller_kinds()
            .validate()
            .context("Invalid controllerKinds")?;
        Ok(())
    }
}

/// Interpret a namespace argument; `None` selects all namespaces
pub fn parse_namespace(namespace: &str) -> Option<String> {
    match namespace.trim() {
        "" | "all" | "-A" => None,
        ns => Some(ns.to_string()),
    }
}
