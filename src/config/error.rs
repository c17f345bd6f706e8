//! Errors raised while loading, validating or saving settings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A path given on the command line or in `USB_SERIAL_CONFIG` is missing.
    #[error("no settings file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("cannot write settings file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line parameter or logging value no port could use, keyed by its
    /// dotted TOML path (`serial.baud_rate`).
    #[error("{key} {reason}")]
    InvalidValue { key: String, reason: String },

    /// An entry under `[[drivers.extra]]` that cannot be registered.
    #[error("driver entry for vendor {vendor_id:04x} {reason}")]
    InvalidDriver { vendor_id: u16, reason: String },

    #[error("{var}={value:?} is not a valid {expected}")]
    InvalidEnv {
        var: String,
        value: String,
        expected: &'static str,
    },

    /// `save` was called on settings that were built from defaults.
    #[error("settings were not loaded from a file; save to an explicit path instead")]
    NoSavePath,
}

impl ConfigError {
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_driver(vendor_id: u16, reason: impl Into<String>) -> Self {
        Self::InvalidDriver {
            vendor_id,
            reason: reason.into(),
        }
    }

    /// The TOML key or environment variable the error is about, if any.
    pub fn setting(&self) -> Option<&str> {
        match self {
            Self::InvalidValue { key, .. } => Some(key),
            Self::InvalidDriver { .. } => Some("drivers.extra"),
            Self::InvalidEnv { var, .. } => Some(var),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
