//! Integration tests for configuration loading and validation

#![allow(clippy::expect_used)]

use keyreg_bridge::config::{BridgeConfig, LineBridgeConfig, LoggingConfig, TransportConfig};
use keyreg_bridge::error::BridgeError;
use keyreg_bridge::utils::clock::ClockMode;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = BridgeConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_defaults_match_documented_behaviour() {
    let config = BridgeConfig::default();
    assert_eq!(config.bridge.clock, ClockMode::Utc);
    assert_eq!(config.bridge.frame_prefixes, vec!["95", "96"]);
    assert!(!config.bridge.echo_raw_hex);
    assert!(config.bridge.verify_registrations);
    assert!(!config.bridge.enforce_validity);
    assert_eq!(config.transport.baud_rate, 115_200);
    assert_eq!(config.transport.read_timeout(), None);
}

#[test]
fn test_invalid_endpoint() {
    let mut config = BridgeConfig::default();
    config.transport.endpoint = "COM3".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid transport endpoint")));
}

#[test]
fn test_empty_endpoint() {
    let mut config = BridgeConfig::default();
    config.transport.endpoint = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_zero_baud_rate() {
    let config = BridgeConfig::default_with_overrides(|c| c.transport.baud_rate = 0);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Baud rate must be greater than 0")));
}

#[test]
fn test_read_timeout_bounds() {
    let mut transport = TransportConfig {
        read_timeout: Duration::from_millis(5),
        ..TransportConfig::default()
    };
    assert!(transport
        .validate()
        .iter()
        .any(|e| e.contains("Read timeout too short")));

    transport.read_timeout = Duration::from_secs(30);
    assert!(transport.validate().is_empty());
    assert_eq!(transport.read_timeout(), Some(Duration::from_secs(30)));
}

#[test]
fn test_line_length_bounds() {
    let small = TransportConfig {
        max_line_length: 100,
        ..TransportConfig::default()
    };
    assert!(small.validate().iter().any(|e| e.contains("too small")));

    let large = TransportConfig {
        max_line_length: 64 * 1024 * 1024,
        ..TransportConfig::default()
    };
    assert!(large.validate().iter().any(|e| e.contains("too large")));
}

#[test]
fn test_frame_prefix_validation() {
    let bridge = LineBridgeConfig {
        frame_prefixes: vec!["95".to_string(), "zz".to_string(), "9".to_string(), String::new()],
        ..LineBridgeConfig::default()
    };
    let errors = bridge.validate();
    assert!(errors.iter().any(|e| e.contains("not hex: 'zz'")));
    assert!(errors.iter().any(|e| e.contains("odd length")));
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));

    let none = LineBridgeConfig {
        frame_prefixes: Vec::new(),
        ..LineBridgeConfig::default()
    };
    assert!(none
        .validate()
        .iter()
        .any(|e| e.contains("At least one frame prefix")));
}

#[test]
fn test_enforce_validity_requires_verification() {
    let bridge = LineBridgeConfig {
        verify_registrations: false,
        enforce_validity: true,
        ..LineBridgeConfig::default()
    };
    assert!(bridge
        .validate()
        .iter()
        .any(|e| e.contains("enforce_validity has no effect")));
}

#[test]
fn test_logging_validation() {
    let logging = LoggingConfig {
        app_name: String::new(),
        log_file_path: Some("/nonexistent/dir/bridge.log".to_string()),
        ..LoggingConfig::default()
    };
    let errors = logging.validate();
    assert!(errors.iter().any(|e| e.contains("Application name cannot be empty")));
    assert!(errors.iter().any(|e| e.contains("Log file directory does not exist")));
}

#[test]
fn test_validate_strict_collects_errors() {
    let config = BridgeConfig::default_with_overrides(|c| {
        c.transport.baud_rate = 0;
        c.bridge.frame_prefixes.clear();
    });

    match config.validate_strict() {
        Err(BridgeError::ConfigError(message)) => {
            assert!(message.contains("Baud rate"));
            assert!(message.contains("frame prefix"));
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = BridgeConfig::from_toml(
        r#"
        [transport]
        endpoint = "tcp:127.0.0.1:4000"

        [bridge]
        clock = "local"
        echo_raw_hex = true
        "#,
    )
    .expect("parse");

    assert_eq!(config.transport.endpoint, "tcp:127.0.0.1:4000");
    assert_eq!(config.transport.baud_rate, 115_200);
    assert_eq!(config.bridge.clock, ClockMode::Local);
    assert!(config.bridge.echo_raw_hex);
    assert_eq!(config.bridge.frame_prefixes, vec!["95", "96"]);
    assert_eq!(config.logging.log_level, Level::INFO);
}

#[test]
fn test_invalid_toml_is_config_error() {
    assert!(matches!(
        BridgeConfig::from_toml("[bridge]\nclock = \"martian\""),
        Err(BridgeError::ConfigError(_))
    ));
    assert!(matches!(
        BridgeConfig::from_toml("[logging]\nlog_level = \"loud\""),
        Err(BridgeError::ConfigError(_))
    ));
}

#[test]
fn test_log_level_names() {
    let config = BridgeConfig::from_toml("[logging]\nlog_level = \"WARN\"").expect("parse");
    assert_eq!(config.logging.log_level, Level::WARN);

    let written = toml::to_string(&config).expect("serialize");
    assert!(written.contains("log_level = \"warn\""), "{written}");
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bridge.toml");

    let config = BridgeConfig::default_with_overrides(|c| {
        c.transport.endpoint = "unix:/run/device.sock".to_string();
        c.transport.read_timeout = Duration::from_millis(2500);
        c.bridge.enforce_validity = true;
        c.logging.log_level = Level::DEBUG;
    });
    config.save_to_file(&path).expect("save");

    let loaded = BridgeConfig::from_file(&path).expect("load");
    assert_eq!(loaded.transport.endpoint, "unix:/run/device.sock");
    assert_eq!(loaded.transport.read_timeout, Duration::from_millis(2500));
    assert!(loaded.bridge.enforce_validity);
    assert_eq!(loaded.logging.log_level, Level::DEBUG);
}

#[test]
fn test_from_file_reads_handwritten_config() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "[transport]\nendpoint = \"/dev/ttyUSB1\"\nbaud_rate = 57600").expect("write");

    let config = BridgeConfig::from_file(file.path()).expect("load");
    assert_eq!(config.transport.endpoint, "/dev/ttyUSB1");
    assert_eq!(config.transport.baud_rate, 57_600);
    assert!(config.validate().is_empty());
}

#[test]
fn test_missing_file_is_config_error() {
    assert!(matches!(
        BridgeConfig::from_file("/nonexistent/keyreg-bridge.toml"),
        Err(BridgeError::ConfigError(_))
    ));
}

#[test]
fn test_example_config_parses() {
    let example = BridgeConfig::example_config();
    assert!(example.contains("[transport]"));
    assert!(example.contains("[bridge]"));
    let parsed = BridgeConfig::from_toml(&example).expect("example parses");
    assert!(parsed.validate().is_empty());
}

// ============================================================================
// ENVIRONMENT OVERRIDES
// ============================================================================

const ENV_VARS: [&str; 5] = [
    "KEYREG_BRIDGE_ENDPOINT",
    "KEYREG_BRIDGE_BAUD_RATE",
    "KEYREG_BRIDGE_READ_TIMEOUT_MS",
    "KEYREG_BRIDGE_CLOCK",
    "KEYREG_BRIDGE_ECHO_RAW_HEX",
];

/// Process environment is shared between test threads
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Holds the env lock and clears every bridge variable on both ends of a test
struct EnvGuard {
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn set(vars: &[(&str, &str)]) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear_env();
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
        Self { _lock: lock }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        clear_env();
    }
}

fn clear_env() {
    for name in ENV_VARS {
        std::env::remove_var(name);
    }
}

#[test]
fn test_env_overrides_every_field() {
    let _env = EnvGuard::set(&[
        ("KEYREG_BRIDGE_ENDPOINT", "tcp:10.0.0.7:4000"),
        ("KEYREG_BRIDGE_BAUD_RATE", "57600"),
        ("KEYREG_BRIDGE_READ_TIMEOUT_MS", "1500"),
        ("KEYREG_BRIDGE_CLOCK", "Local"),
        ("KEYREG_BRIDGE_ECHO_RAW_HEX", "true"),
    ]);

    let config = BridgeConfig::from_env().expect("env config");
    assert_eq!(config.transport.endpoint, "tcp:10.0.0.7:4000");
    assert_eq!(config.transport.baud_rate, 57_600);
    assert_eq!(config.transport.read_timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(config.bridge.clock, ClockMode::Local);
    assert!(config.bridge.echo_raw_hex);
    assert!(config.validate().is_empty());
}

#[test]
fn test_env_applies_over_file_values() {
    let _env = EnvGuard::set(&[("KEYREG_BRIDGE_BAUD_RATE", " 9600 ")]);

    let mut config = BridgeConfig::from_toml(
        "[transport]\nendpoint = \"/dev/ttyUSB0\"\nbaud_rate = 57600",
    )
    .expect("parse");
    config.apply_env().expect("apply env");

    assert_eq!(config.transport.endpoint, "/dev/ttyUSB0");
    assert_eq!(config.transport.baud_rate, 9_600);
}

#[test]
fn test_env_blank_values_are_ignored() {
    let _env = EnvGuard::set(&[
        ("KEYREG_BRIDGE_ENDPOINT", ""),
        ("KEYREG_BRIDGE_BAUD_RATE", "   "),
        ("KEYREG_BRIDGE_CLOCK", ""),
    ]);

    let config = BridgeConfig::from_env().expect("env config");
    let defaults = BridgeConfig::default();
    assert_eq!(config.transport.endpoint, defaults.transport.endpoint);
    assert_eq!(config.transport.baud_rate, defaults.transport.baud_rate);
    assert_eq!(config.bridge.clock, ClockMode::Utc);
}

#[test]
fn test_env_malformed_values_are_config_errors() {
    let cases = [
        ("KEYREG_BRIDGE_BAUD_RATE", "fast"),
        ("KEYREG_BRIDGE_READ_TIMEOUT_MS", "-5"),
        ("KEYREG_BRIDGE_CLOCK", "gmt"),
        ("KEYREG_BRIDGE_ECHO_RAW_HEX", "sometimes"),
    ];

    for (name, value) in cases {
        let _env = EnvGuard::set(&[(name, value)]);
        match BridgeConfig::from_env() {
            Err(BridgeError::ConfigError(message)) => {
                assert!(message.contains(value), "{name}: {message}");
            }
            other => panic!("{name}={value} should be rejected, got {other:?}"),
        }
    }
}
