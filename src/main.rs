//! controlled-pods - list the Pods a Kubernetes workload controls
//!
//! Watches Pods and ReplicaSets, waits for both caches to sync and resolves
//! the Pods owned by an object either directly or through its ReplicaSets.

mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cli::{ConfigSubcommand, PodsArgs};
use controlled_pods::config::ConfigLoader;

/// List the Pods controlled by a Kubernetes workload
#[derive(Parser, Debug)]
#[command(name = "controlled-pods")]
#[command(about = "List the Pods controlled by a Kubernetes workload", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Main commands
#[derive(Subcommand, Debug)]
enum Command {
    /// List the Pods controlled by an object
    Pods(PodsArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = cli::init_logging(args.debug)?;
    if let Some(ref log_path) = log_file {
        eprintln!(
            "Debug logging enabled. Logs written to: {}",
            log_path.display()
        );
    }

    match args.command {
        Command::Pods(pods) => {
            let config = ConfigLoader::load(args.config.as_deref())
                .context("Failed to load configuration")?;
            tracing::debug!(
                "Configuration loaded: namespace={:?}, syncTimeoutSecs={}",
                config.namespace,
                config.sync_timeout_secs
            );
            cli::handle_pods_command(pods, config).await
        }
        Command::Config { subcommand } => {
            cli::handle_config_command(subcommand, args.config.as_deref())
        }
        Command::Version => {
            cli::display_version();
            Ok(())
        }
    }
}
