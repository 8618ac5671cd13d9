//! CLI command handling module
//!
//! Handles all CLI subcommands and argument parsing.

mod config;
mod logging;
mod pods;
mod version;

pub use config::{ConfigSubcommand, handle_config_command};
pub use logging::init_logging;
pub use pods::{PodsArgs, handle_pods_command};
pub use version::display_version;
