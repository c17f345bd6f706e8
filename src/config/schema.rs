//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! Every section has defaults, so an empty file is a valid configuration.

use super::error::{ConfigError, ConfigResult};
use crate::drivers::DriverDeclaration;
use crate::monitor::MonitorOptions;
use crate::params::SerialPortParameters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parameters used when a port is opened without explicit ones
    pub serial: SerialPortParameters,
    /// Background monitor tuning
    pub monitor: MonitorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Extra driver declarations
    pub drivers: DriversConfig,
    /// Short names for port paths, e.g. `arduino = "/dev/ttyACM0"`
    pub aliases: BTreeMap<String, String>,
}

impl Config {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Reject values no port could be opened with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::invalid_value("serial.baud_rate", "must be non-zero"));
        }
        if self.serial.read_buffer_size == 0 {
            return Err(ConfigError::invalid_value("serial.read_buffer_size", "must be non-zero"));
        }
        if self.serial.write_buffer_size == 0 {
            return Err(ConfigError::invalid_value("serial.write_buffer_size", "must be non-zero"));
        }
        if self.serial.new_line.is_empty() {
            return Err(ConfigError::invalid_value("serial.new_line", "must not be empty"));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!("unknown level '{}'", self.logging.level),
            ));
        }
        for decl in &self.drivers.extra {
            if decl.product_ids.is_empty() {
                return Err(ConfigError::invalid_driver(decl.vendor_id, "lists no product ids"));
            }
            let mut seen = std::collections::BTreeSet::new();
            if let Some(pid) = decl.product_ids.iter().find(|pid| !seen.insert(**pid)) {
                return Err(ConfigError::invalid_driver(
                    decl.vendor_id,
                    format!("lists product id {pid:04x} twice"),
                ));
            }
        }
        Ok(())
    }
}

/// Monitor configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How long closing a port waits for the polling loop, in milliseconds
    pub stop_timeout_ms: u64,
    /// Pause after a failed read, in milliseconds
    pub error_backoff_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 1000,
            error_backoff_ms: 50,
        }
    }
}

impl MonitorConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Monitor options; the chunk size is taken from the open parameters.
    pub fn options(&self) -> MonitorOptions {
        MonitorOptions {
            stop_timeout: self.stop_timeout(),
            error_backoff: self.error_backoff(),
            ..MonitorOptions::default()
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Append log output to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

/// Driver configuration section.
///
/// Declarations here are registered after the built-in table, so they can
/// add identities but never replace a built-in one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    pub extra: Vec<DriverDeclaration>,
}
