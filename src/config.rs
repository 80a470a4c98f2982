//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working setup: 9600 baud, 1 s read timeout, 100 ms poll interval and a
//! 100 s display window.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TelemetryError};
use crate::protocol::types::{ControlCommand, CONTROL_VALUE_MAX, CONTROL_VALUE_MIN};
use crate::serial::port_trait::PortSettings;

/// Baud rates the device firmware can be built with
const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SerialConfig {
    /// Port to open at startup; empty means wait for `connect <port>`
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Channel buffer configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BufferConfig {
    #[serde(default = "default_display_window_s")]
    pub display_window_s: u64,
}

/// Initial control values
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ControlConfig {
    #[serde(default)]
    pub value1: f64,

    #[serde(default)]
    pub value2: f64,
}

/// CSV export configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ExportConfig {
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; empty logs to stderr
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_baud_rate() -> u32 { 9600 }
fn default_timeout_ms() -> u64 { 1000 }
fn default_poll_interval_ms() -> u64 { 100 }

fn default_display_window_s() -> u64 { 100 }

fn default_export_directory() -> PathBuf { PathBuf::from(".") }
fn default_file_prefix() -> String { "sensor_data".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            display_window_s: default_display_window_s(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

impl SerialConfig {
    /// Port settings for opening the device
    #[must_use]
    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl BufferConfig {
    #[must_use]
    pub fn display_window(&self) -> Duration {
        Duration::from_secs(self.display_window_s)
    }
}

impl ControlConfig {
    #[must_use]
    pub fn command(&self) -> ControlCommand {
        ControlCommand::new(self.value1, self.value2)
    }
}

fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use serial_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.serial.poll_interval_ms == 0 || self.serial.poll_interval_ms > 10000 {
            return Err(invalid("poll_interval_ms must be between 1 and 10000"));
        }

        if self.buffer.display_window_s == 0 {
            return Err(invalid("display_window_s must be greater than 0"));
        }

        for (name, value) in [("value1", self.control.value1), ("value2", self.control.value2)] {
            if !(CONTROL_VALUE_MIN..=CONTROL_VALUE_MAX).contains(&value) {
                return Err(invalid(format!("control {} must be between 0 and 100", name)));
            }
        }

        if self.export.file_prefix.is_empty() {
            return Err(invalid("export file_prefix cannot be empty"));
        }

        if self.export.directory.as_os_str().is_empty() {
            return Err(invalid("export directory cannot be empty"));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(invalid(format!("invalid logging level: {:?}", self.logging.level)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.port_settings(), PortSettings::default());
        assert_eq!(config.serial.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.buffer.display_window(), Duration::from_secs(100));
        assert_eq!(config.control.command(), ControlCommand::default());
    }

    #[test]
    fn test_empty_file_equals_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
timeout_ms = 500

[buffer]
display_window_s = 30

[control]
value1 = 12.5
value2 = 80

[export]
directory = "exports"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.timeout_ms, 500);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.buffer.display_window_s, 30);
        assert_eq!(config.control.command(), ControlCommand::new(12.5, 80.0));
        assert_eq!(config.export.directory, PathBuf::from("exports"));
        assert_eq!(config.export.file_prefix, "sensor_data");
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load("/nonexistent/serial-telemetry.toml");
        assert!(matches!(result, Err(TelemetryError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml("[serial\nport = ");
        assert!(matches!(result, Err(TelemetryError::Config(_))));
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = Config::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());

        config.serial.timeout_ms = 10001;
        assert!(config.validate().is_err());

        config.serial.timeout_ms = 10000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval_bounds() {
        let mut config = Config::default();
        config.serial.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_display_window() {
        let mut config = Config::default();
        config.buffer.display_window_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_control_values_out_of_range() {
        let mut config = Config::default();
        config.control.value1 = 100.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.control.value2 = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.control.value1 = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_file_prefix() {
        let mut config = Config::default();
        config.export.file_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "serial_telemetry=loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "serial_telemetry=debug".to_string();
        assert!(config.validate().is_ok());
    }
}
