//! Configuration validation

use crate::schema::{RawApiConfig, RawConfig, RawSessionsConfig, RawSosConfig};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {field}: {message}")]
    FieldError {
        section: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("Invalid base URL '{value}': {message}")]
    InvalidUrl { value: String, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

impl ValidationError {
    fn field(section: &'static str, field: &'static str, message: impl Into<String>) -> Self {
        Self::FieldError {
            section,
            field,
            message: message.into(),
        }
    }
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_api(&config.api));
    errors.extend(validate_sos(&config.sos));
    errors.extend(validate_sessions(&config.sessions));

    let timeout = config
        .sos
        .location_timeout_ms
        .unwrap_or(crate::DEFAULT_LOCATION_TIMEOUT_MS);
    if let Some(grace) = config.sos.location_grace_ms
        && grace > timeout
    {
        errors.push(ValidationError::GlobalError(format!(
            "sos.location_grace_ms ({grace}) exceeds sos.location_timeout_ms ({timeout})"
        )));
    }

    errors
}

fn validate_api(api: &RawApiConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(url) = &api.base_url {
        if let Err(message) = check_base_url(url) {
            errors.push(ValidationError::InvalidUrl {
                value: url.clone(),
                message,
            });
        }
    }

    if api.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::field(
            "api",
            "request_timeout_seconds",
            "must be greater than 0",
        ));
    }

    if let Some(path) = &api.token_file
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::field("api", "token_file", "cannot be empty"));
    }

    errors
}

fn validate_sos(sos: &RawSosConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match sos.countdown_seconds {
        Some(0) => errors.push(ValidationError::field(
            "sos",
            "countdown_seconds",
            "must be at least 1",
        )),
        Some(s) if s > 60 => errors.push(ValidationError::field(
            "sos",
            "countdown_seconds",
            format!("{s} is longer than the 60 second maximum"),
        )),
        _ => {}
    }

    if sos.location_timeout_ms == Some(0) {
        errors.push(ValidationError::field(
            "sos",
            "location_timeout_ms",
            "must be greater than 0",
        ));
    }

    for (field, value) in [
        ("success_display_seconds", sos.success_display_seconds),
        ("failure_display_seconds", sos.failure_display_seconds),
        ("cancel_display_seconds", sos.cancel_display_seconds),
    ] {
        if value == Some(0) {
            errors.push(ValidationError::field("sos", field, "must be greater than 0"));
        }
    }

    if let Some(message) = &sos.alert_message
        && message.trim().is_empty()
    {
        errors.push(ValidationError::field("sos", "alert_message", "cannot be blank"));
    }

    errors
}

fn validate_sessions(sessions: &RawSessionsConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if sessions.tick_interval_seconds == Some(0) {
        errors.push(ValidationError::field(
            "sessions",
            "tick_interval_seconds",
            "must be greater than 0",
        ));
    }

    if sessions.update_interval_seconds == Some(0) {
        errors.push(ValidationError::field(
            "sessions",
            "update_interval_seconds",
            "must be greater than 0",
        ));
    }

    if sessions.max_duration_minutes == Some(0) {
        errors.push(ValidationError::field(
            "sessions",
            "max_duration_minutes",
            "must be greater than 0",
        ));
    }

    for (field, value) in [
        ("start_message", &sessions.start_message),
        ("delay_message", &sessions.delay_message),
        ("escalation_message", &sessions.escalation_message),
    ] {
        if let Some(template) = value
            && template.trim().is_empty()
        {
            errors.push(ValidationError::field("sessions", field, "cannot be blank"));
        }
    }

    errors
}

/// Accept `http://` or `https://` URLs with a host part
pub fn check_base_url(url: &str) -> Result<(), String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| "must start with http:// or https://".to_string())?;

    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err("missing host".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    fn config() -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            api: RawApiConfig::default(),
            sos: RawSosConfig::default(),
            sessions: RawSessionsConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&config()).is_empty());
    }

    #[test]
    fn zero_countdown_rejected() {
        let mut raw = config();
        raw.sos.countdown_seconds = Some(0);
        let errors = validate_config(&raw);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("countdown_seconds"));
    }

    #[test]
    fn bad_url_rejected() {
        let mut raw = config();
        raw.api.base_url = Some("ftp://example.org".into());
        let errors = validate_config(&raw);
        assert!(matches!(errors[0], ValidationError::InvalidUrl { .. }));
    }

    #[test]
    fn base_url_checks() {
        assert!(check_base_url("https://api.example.org/").is_ok());
        assert!(check_base_url("http://localhost:8080").is_ok());
        assert!(check_base_url("https://").is_err());
        assert!(check_base_url("example.org").is_err());
    }

    #[test]
    fn blank_templates_rejected() {
        let mut raw = config();
        raw.sessions.delay_message = Some("  ".into());
        raw.sessions.tick_interval_seconds = Some(0);
        assert_eq!(validate_config(&raw).len(), 2);
    }
}
