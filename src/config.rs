//! # Configuration Management
//!
//! Centralized configuration for the commissioning bridge.
//!
//! Three sections: the device link (`transport`), line handling and
//! verification policy (`bridge`), and log output (`logging`).
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Environment variables via `from_env()`
//! - Defaults with programmatic overrides via `default_with_overrides()`
//!
//! ## Example
//! ```toml
//! [transport]
//! endpoint = "serial:/dev/ttyACM0"
//! baud_rate = 115200
//! read_timeout = 0
//! max_line_length = 4096
//!
//! [bridge]
//! clock = "utc"
//! frame_prefixes = ["95", "96"]
//! echo_raw_hex = false
//! verify_registrations = true
//! enforce_validity = false
//! ```

use crate::core::line_codec::DEFAULT_MAX_LINE_LENGTH;
use crate::error::{BridgeError, Result};
use crate::transport::Endpoint;
use crate::utils::clock::ClockMode;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default link speed for serial endpoints
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Frame prefixes recognised by default: hex of the fixarray(5) and fixarray(6) markers
pub const DEFAULT_FRAME_PREFIXES: [&str; 2] = ["95", "96"];

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BridgeConfig {
    /// Device link configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Line handling and verification policy
    #[serde(default)]
    pub bridge: LineBridgeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables over the defaults.
    ///
    /// Unlike a TOML file, a malformed variable is an error rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `KEYREG_BRIDGE_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(endpoint) = env_var("KEYREG_BRIDGE_ENDPOINT") {
            self.transport.endpoint = endpoint;
        }

        if let Some(baud) = env_var("KEYREG_BRIDGE_BAUD_RATE") {
            self.transport.baud_rate = parse_env("KEYREG_BRIDGE_BAUD_RATE", &baud)?;
        }

        if let Some(timeout) = env_var("KEYREG_BRIDGE_READ_TIMEOUT_MS") {
            let millis: u64 = parse_env("KEYREG_BRIDGE_READ_TIMEOUT_MS", &timeout)?;
            self.transport.read_timeout = Duration::from_millis(millis);
        }

        if let Some(clock) = env_var("KEYREG_BRIDGE_CLOCK") {
            self.bridge.clock = clock.trim().parse().map_err(BridgeError::ConfigError)?;
        }

        if let Some(echo) = env_var("KEYREG_BRIDGE_ECHO_RAW_HEX") {
            self.bridge.echo_raw_hex = parse_env("KEYREG_BRIDGE_ECHO_RAW_HEX", &echo)?;
        }

        Ok(())
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| BridgeError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.transport.validate());
        errors.extend(self.bridge.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BridgeError::ConfigError(format!("Invalid value for {name}: '{value}'")))
}

/// Device link configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `serial:<device>`, `tcp:<host:port>` or `unix:<path>`
    pub endpoint: String,

    /// Link speed for serial endpoints
    pub baud_rate: u32,

    /// Longest idle wait for a line; zero waits forever
    #[serde(with = "millis_serde")]
    pub read_timeout: Duration,

    /// Longest accepted line in bytes; longer lines are dropped
    pub max_line_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("serial:/dev/ttyACM0"),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::ZERO,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl TransportConfig {
    /// Read timeout, `None` when disabled
    pub fn read_timeout(&self) -> Option<Duration> {
        (!self.read_timeout.is_zero()).then_some(self.read_timeout)
    }

    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.endpoint.is_empty() {
            errors.push("Transport endpoint cannot be empty".to_string());
        } else if let Err(e) = self.endpoint.parse::<Endpoint>() {
            errors.push(format!("Invalid transport endpoint '{}': {e}", self.endpoint));
        }

        if self.baud_rate == 0 {
            errors.push("Baud rate must be greater than 0".to_string());
        }

        if !self.read_timeout.is_zero() && self.read_timeout.as_millis() < 10 {
            errors.push("Read timeout too short (minimum: 10ms, or 0 to disable)".to_string());
        }

        // A reference registration frame is 468 hex characters
        if self.max_line_length < 512 {
            errors.push(format!(
                "Max line length too small: {} (minimum: 512)",
                self.max_line_length
            ));
        } else if self.max_line_length > 1024 * 1024 {
            errors.push(format!(
                "Max line length too large: {} (maximum: 1 MB)",
                self.max_line_length
            ));
        }

        errors
    }
}

/// Line handling and verification policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LineBridgeConfig {
    /// Clock used to answer `TIME:` requests
    pub clock: ClockMode,

    /// Hex prefixes that mark a line as a protocol frame
    pub frame_prefixes: Vec<String>,

    /// Print the raw hex before the decoded form
    pub echo_raw_hex: bool,

    /// Verify key registration signatures
    pub verify_registrations: bool,

    /// Reject registrations outside their validity window
    pub enforce_validity: bool,
}

impl Default for LineBridgeConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::default(),
            frame_prefixes: DEFAULT_FRAME_PREFIXES.iter().map(|p| p.to_string()).collect(),
            echo_raw_hex: false,
            verify_registrations: true,
            enforce_validity: false,
        }
    }
}

impl LineBridgeConfig {
    /// Validate bridge configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.frame_prefixes.is_empty() {
            errors.push("At least one frame prefix must be configured".to_string());
        }

        for prefix in &self.frame_prefixes {
            if prefix.is_empty() {
                errors.push("Frame prefixes cannot be empty".to_string());
            } else if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
                errors.push(format!("Frame prefix is not hex: '{prefix}'"));
            } else if prefix.len() % 2 != 0 {
                errors.push(format!(
                    "Frame prefix must cover whole bytes: '{prefix}' has odd length"
                ));
            }
        }

        if self.enforce_validity && !self.verify_registrations {
            errors.push(
                "enforce_validity has no effect when verify_registrations is disabled".to_string(),
            );
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "level_serde")]
    pub log_level: Level,

    /// Path to log file; logs go to stderr when unset
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("keyreg-bridge"),
            log_level: Level::INFO,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if let Some(ref path) = self.log_file_path {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    errors.push(format!(
                        "Log file directory does not exist: {}",
                        parent.display()
                    ));
                }
            }
        }

        errors
    }
}

/// `Duration` stored as whole milliseconds
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `tracing::Level` as a lowercase name; parsing is case-insensitive
mod level_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse()
            .map_err(|_| D::Error::custom(format!("unknown log level '{name}'")))
    }
}
