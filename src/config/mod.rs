//! Configuration module for usb-serial-bridge.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `USB_SERIAL_CONFIG` environment variable (explicit path)
//! 2. `./usb-serial.toml` (current directory)
//! 3. `~/.config/usb-serial-bridge/usb-serial.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\usb-serial-bridge\usb-serial.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `USB_SERIAL_<SECTION>_<KEY>`:
//! - `USB_SERIAL_SERIAL_BAUD_RATE=9600`
//! - `USB_SERIAL_SERIAL_READ_TIMEOUT_MS=50`
//! - `USB_SERIAL_SERIAL_WRITE_TIMEOUT_MS=50`
//! - `USB_SERIAL_LOGGING_LEVEL=debug`
//! - `USB_SERIAL_MONITOR_STOP_TIMEOUT_MS=250`
//!
//! # Example
//!
//! ```rust,no_run
//! use usb_serial_bridge::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! println!("Default baud: {}", loader.config().serial.baud_rate);
//! # Ok::<(), usb_serial_bridge::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, DriversConfig, LogFormat, LoggingConfig, MonitorConfig};
