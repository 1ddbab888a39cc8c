//! Configuration module for the playground engine.
//!
//! Loads YAML configuration with environment variable interpolation and
//! validates it before the engine starts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use playground_engine::config::load_config;
//!
//! // Defaults apply to every missing section
//! let config = load_config(Some("config.yaml"))?;
//! let settings = config.engine_settings()?;
//! ```

mod brokers;
mod calendar;
mod engine;
mod observability;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use brokers::{BrokersConfig, MockBrokerConfig};
pub use calendar::CalendarConfig;
pub use engine::EngineConfig;
pub use observability::LoggingConfig;

use crate::application::EngineSettings;

/// Account types the mock broker may report.
const MOCK_ACCOUNT_TYPES: [&str; 3] = ["margin", "pdt", "cash"];

/// Log levels accepted by `logging.level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Engine timing and capacities.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Simulator market calendar.
    #[serde(default)]
    pub calendar: CalendarConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Brokers.
    #[serde(default)]
    pub brokers: BrokersConfig,
}

impl Config {
    /// Settings for the engine's use cases and reconciler.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        Ok(EngineSettings {
            poll_interval: self.engine.poll_interval(),
            broker_timeout: self.engine.broker_timeout(),
            queue_capacity: self.engine.queue_capacity,
            commit_interval: self.engine.commit_interval(),
            max_internal_errors: self.engine.max_internal_errors,
            calendar: self.calendar.settings()?,
        })
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Without one, every section
///   takes its defaults.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        let config = Config::default();
        validate_config(&config)?;
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let engine = &config.engine;
    if engine.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "engine.poll_interval_ms must be positive".to_string(),
        ));
    }
    if engine.broker_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.broker_timeout_secs must be positive".to_string(),
        ));
    }
    if engine.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "engine.queue_capacity must be positive".to_string(),
        ));
    }
    if engine.commit_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "engine.commit_interval_ms must be positive".to_string(),
        ));
    }
    if engine.max_internal_errors == 0 {
        return Err(ConfigError::ValidationError(
            "engine.max_internal_errors must be positive".to_string(),
        ));
    }

    let hours = config.calendar.hours()?;
    if hours.open >= hours.close {
        return Err(ConfigError::ValidationError(
            "calendar.market_open must be before calendar.market_close".to_string(),
        ));
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "logging.level must be one of: {LOG_LEVELS:?}"
        )));
    }

    let mock = &config.brokers.mock;
    if !MOCK_ACCOUNT_TYPES.contains(&mock.account_type.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "brokers.mock.account_type must be one of: {MOCK_ACCOUNT_TYPES:?}"
        )));
    }
    if mock.equity.is_sign_negative() {
        return Err(ConfigError::ValidationError(
            "brokers.mock.equity must not be negative".to_string(),
        ));
    }
    if mock.quote_price.is_sign_negative() {
        return Err(ConfigError::ValidationError(
            "brokers.mock.quote_price must not be negative".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.engine.poll_interval_ms, 250);
        assert_eq!(config.engine.broker_timeout_secs, 10);
        assert_eq!(config.engine.queue_capacity, 1024);
        assert_eq!(config.engine.commit_interval_ms, 500);
        assert_eq!(config.engine.max_internal_errors, 3);
        assert!(!config.calendar.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.brokers.mock.enabled);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = r"
engine:
  poll_interval_ms: 10
";

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.engine.poll_interval_ms, 10);
        assert_eq!(config.engine.queue_capacity, 1024);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = load_config_from_string("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "calendar:\n  enabled: true\n  holidays: [2024-01-03]\nlogging:\n  level: debug\n  json: true"
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert!(config.calendar.enabled);
        assert_eq!(config.calendar.holidays.len(), 1);
        assert!(config.logging.json);

        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        let calendar = settings.calendar.unwrap();
        assert_eq!(calendar.holidays.len(), 1);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = load_config(Some("/nonexistent/playground-engine.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_no_path_uses_defaults() {
        let config = load_config(None).unwrap();
        assert!(config.engine_settings().unwrap().calendar.is_none());
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "level: ${PLAYGROUND_CONFIG_TEST_NONEXISTENT_VAR:-warn}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "level: warn");
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "account_type: ${PLAYGROUND_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "account_type: ");
    }

    #[test]
    fn test_validation_zero_capacity() {
        let yaml = r"
engine:
  queue_capacity: 0
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for zero capacity");
        };
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn test_validation_open_after_close() {
        let yaml = r#"
calendar:
  market_open: "16:00"
  market_close: "09:30"
"#;
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for inverted hours");
        };
        assert!(err.to_string().contains("market_open"));
    }

    #[test]
    fn test_validation_bad_time_format() {
        let yaml = r#"
calendar:
  market_open: "9.30am"
"#;
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_validation_unknown_account_type() {
        let yaml = r"
brokers:
  mock:
    account_type: ira
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for unknown account type");
        };
        assert!(err.to_string().contains("account_type"));
    }

    #[test]
    fn test_validation_unknown_log_level() {
        let yaml = r"
logging:
  level: loud
";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_mock_broker_quotes() {
        let yaml = r"
brokers:
  mock:
    quote_price: 42.5
    auto_fill: true
";
        let config = load_config_from_string(yaml).expect("valid mock config");
        assert_eq!(config.brokers.mock.quote_price, rust_decimal::Decimal::new(425, 1));
        assert!(config.brokers.mock.auto_fill);

        let negative = r"
brokers:
  mock:
    quote_price: -1
";
        assert!(load_config_from_string(negative).is_err());
    }
}
