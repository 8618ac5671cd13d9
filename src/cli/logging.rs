//! Logging initialization

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Initialize logging based on debug flag
///
/// Without `debug`, warnings go to stderr (`RUST_LOG` overrides the filter).
/// With `debug`, everything down to debug level goes to a temporary log file
/// so stdout stays clean for output; its path is returned.
pub fn init_logging(debug: bool) -> Result<Option<PathBuf>> {
    if debug {
        let temp_file = tempfile::Builder::new()
            .prefix("controlled-pods-")
            .suffix(".log")
            .tempfile()
            .map(|f| {
                let path = f.path().to_path_buf();
                // Keep the file after exit so the log can be inspected
                std::mem::forget(f);
                path
            })
            .unwrap_or_else(|_| {
                std::env::temp_dir().join(format!("controlled-pods-{}.log", std::process::id()))
            });

        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_file)
            .with_context(|| format!("Failed to open log file: {}", temp_file.display()))?;

        tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();

        Ok(Some(temp_file))
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_target(false)
            .init();

        Ok(None)
    }
}
