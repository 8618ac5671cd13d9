//! Configuration subcommands

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use controlled_pods::config::{ConfigLoader, paths};

/// Configuration management subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSubcommand {
    /// Show configuration file path
    Path,
    /// Print the effective configuration (file, environment and defaults merged)
    Show,
    /// Validate configuration
    Validate,
}

/// Handle configuration subcommands
pub fn handle_config_command(cmd: ConfigSubcommand, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigSubcommand::Path => {
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(paths::config_file_path);
            println!("{}", path.display());
        }
        ConfigSubcommand::Show => {
            let config = ConfigLoader::load(config_path).context("Failed to load configuration")?;
            let yaml =
                serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
            print!("{}", yaml);
        }
        ConfigSubcommand::Validate => {
            ConfigLoader::load(config_path).context("Configuration validation failed")?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}
