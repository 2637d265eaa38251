//! Configuration parsing and validation for safeguardd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Backend endpoint and credential location
//! - SOS countdown timings and alert text
//! - Session enforcement cadence and notice templates
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields default settings
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "No config file, using defaults");
        return Ok(Settings::default());
    }
    load_config(path)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config("config_version = 1").unwrap();
        assert_eq!(settings.sos.countdown_seconds, DEFAULT_COUNTDOWN_SECS);
        assert_eq!(settings.sos.alert_message, DEFAULT_ALERT_MESSAGE);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            socket_path = "/tmp/safeguard-test/safeguardd.sock"

            [api]
            base_url = "https://safety.example.org"
            request_timeout_seconds = 10

            [sos]
            countdown_seconds = 3
            location_timeout_ms = 2000
            location_grace_ms = 500

            [sessions]
            tick_interval_seconds = 15
            max_duration_minutes = 240
            escalation_message = "{name}: no arrival"
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.api.base_url, "https://safety.example.org/");
        assert_eq!(settings.api.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.sos.countdown_seconds, 3);
        assert_eq!(settings.sos.location_grace, Duration::from_millis(500));
        assert_eq!(settings.sessions.tick_interval, Duration::from_secs(15));
        assert_eq!(settings.sessions.max_duration_minutes, 240);
        assert_eq!(settings.sessions.escalation_message, "{name}: no arrival");
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = r#"
            config_version = 1

            [sos]
            countdown_seconds = 0
        "#;
        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { errors }) if errors.len() == 1));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.sessions.retry_interval, Duration::from_secs(60));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_version = 1\n[sos]\ncountdown_seconds = 7\n").unwrap();
        let settings = load_config(&path).unwrap();
        assert_eq!(settings.sos.countdown_seconds, 7);
    }
}
