//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "USB_SERIAL";

/// Config file name
const CONFIG_FILE_NAME: &str = "usb-serial.toml";

/// Directory under the platform config dir
const APP_DIR_NAME: &str = "usb-serial-bridge";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "USB_SERIAL_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `USB_SERIAL_CONFIG` environment variable (explicit path)
    /// 2. `./usb-serial.toml` (current directory)
    /// 3. `~/.config/usb-serial-bridge/usb-serial.toml` (XDG on Linux/macOS)
    /// 4. `%APPDATA%\usb-serial-bridge\usb-serial.toml` (Windows)
    /// 5. Built-in defaults (no file required)
    ///
    /// Environment variables override file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides still apply; malformed ones are ignored.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::NoSavePath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.validate()?;
            self.config = config;
        }
        Ok(())
    }

    /// The effective configuration as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(&self.config)?)
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::Parse)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse `USB_SERIAL_<suffix>` if it is set.
fn env_value<T: FromStr>(suffix: &str, what: &'static str) -> ConfigResult<Option<T>> {
    let var = format!("{}_{}", ENV_PREFIX, suffix);
    match std::env::var(&var) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var,
                value: val,
                expected: what,
            }),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `USB_SERIAL_<SECTION>_<KEY>`
/// For example:
/// - `USB_SERIAL_SERIAL_BAUD_RATE=9600`
/// - `USB_SERIAL_LOGGING_LEVEL=debug`
/// - `USB_SERIAL_MONITOR_STOP_TIMEOUT_MS=250`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Some(val) = env_value("SERIAL_BAUD_RATE", "baud rate")? {
        config.serial.baud_rate = val;
    }
    if let Some(val) = env_value("SERIAL_READ_TIMEOUT_MS", "timeout")? {
        config.serial.read_timeout_ms = val;
    }
    if let Some(val) = env_value("SERIAL_WRITE_TIMEOUT_MS", "timeout")? {
        config.serial.write_timeout_ms = val;
    }
    if let Some(val) = env_value::<String>("LOGGING_LEVEL", "log level")? {
        config.logging.level = val;
    }
    if let Some(val) = env_value("MONITOR_STOP_TIMEOUT_MS", "timeout")? {
        config.monitor.stop_timeout_ms = val;
    }
    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 115200);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("USB_SERIAL_SERIAL_BAUD_RATE", "9600");
        env::set_var("USB_SERIAL_LOGGING_LEVEL", "debug");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 9600);
        assert_eq!(loader.config().logging.level, "debug");

        env::remove_var("USB_SERIAL_SERIAL_BAUD_RATE");
        env::remove_var("USB_SERIAL_LOGGING_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_parse_error() {
        env::set_var("USB_SERIAL_MONITOR_STOP_TIMEOUT_MS", "soon");
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        env::remove_var("USB_SERIAL_MONITOR_STOP_TIMEOUT_MS");

        assert!(matches!(
            err,
            ConfigError::InvalidEnv { ref var, .. } if var == "USB_SERIAL_MONITOR_STOP_TIMEOUT_MS"
        ));
    }

    #[test]
    #[serial]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut loader = ConfigLoader::with_defaults();
        loader.config_mut().serial.baud_rate = 57600;
        loader.save_to(&path).unwrap();

        let mut reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config().serial.baud_rate, 57600);

        std::fs::write(&path, "[serial]\nbaud_rate = 19200\n").unwrap();
        reloaded.reload().unwrap();
        assert_eq!(reloaded.config().serial.baud_rate, 19200);
    }

    #[test]
    #[serial]
    fn test_explicit_path_env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[logging]\nformat = \"json\"\n").unwrap();

        env::set_var(CONFIG_PATH_ENV, &path);
        let resolved = resolve_config_path();
        env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(resolved, Some(path));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_from("/nonexistent/usb-serial.toml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
