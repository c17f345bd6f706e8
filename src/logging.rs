//! Tracing subscriber setup.

use crate::config::{LogFormat, LoggingConfig};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber described by `config`.
///
/// Returns false if a global subscriber was already installed. If the log
/// file cannot be opened, output goes to stderr and a warning is logged.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let mut file_error = None;
    let writer = match &config.file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(BoxMakeWriter::new(Mutex::new(file))),
            Err(e) => {
                file_error = Some(format!("{}: {}", path.display(), e));
                None
            }
        },
        None => None,
    };
    let ansi = writer.is_none();
    let writer = writer.unwrap_or_else(|| BoxMakeWriter::new(std::io::stderr));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_ansi(ansi)
        .with_writer(writer);
    let installed = match config.format {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
        LogFormat::Pretty => builder.pretty().try_init().is_ok(),
    };

    if let Some(error) = file_error {
        warn!("Cannot open log file {}, logging to stderr", error);
    }
    installed
}
