//! Structured logging setup.
//!
//! Logs go to stderr (or a file) so stdout carries only operator lines.
//! `RUST_LOG` overrides the configured level when set.

use crate::config::LoggingConfig;
use crate::error::{BridgeError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber described by `config`.
///
/// # Errors
/// Returns `BridgeError::ConfigError` if the log file cannot be opened or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.log_level).into())
        .from_env_lossy();

    let writer = match &config.log_file_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    BridgeError::ConfigError(format!("Failed to open log file {path}: {e}"))
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.log_file_path.is_none())
        .with_writer(writer);
    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed
        .map_err(|e| BridgeError::ConfigError(format!("Failed to install log subscriber: {e}")))?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}
