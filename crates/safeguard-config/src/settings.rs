//! Validated settings structures

use crate::schema::{RawApiConfig, RawConfig, RawServiceConfig, RawSessionsConfig, RawSosConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_COUNTDOWN_SECS: u32 = 5;
pub const DEFAULT_LOCATION_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOCATION_GRACE_MS: u64 = 1_000;
pub const DEFAULT_SUCCESS_DISPLAY_SECS: u64 = 8;
pub const DEFAULT_FAILURE_DISPLAY_SECS: u64 = 10;
pub const DEFAULT_CANCEL_DISPLAY_SECS: u64 = 3;
pub const DEFAULT_ALERT_MESSAGE: &str = "EMERGENCY! I need immediate help!";
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_START_TOLERANCE_SECS: u64 = 60;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_UPDATE_INTERVAL_SECS: u32 = 30;
pub const DEFAULT_MAX_DURATION_MINUTES: u32 = 480;
pub const DEFAULT_START_MESSAGE: &str = "{name} has started. Location sharing is on.";
pub const DEFAULT_DELAY_MESSAGE: &str = "{name} has not confirmed arrival on time.";
pub const DEFAULT_ESCALATION_MESSAGE: &str =
    "EMERGENCY! {name} did not confirm arrival. I may need help!";

/// Validated settings ready for use by the engines and the daemon
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceSettings,
    pub api: ApiSettings,
    pub sos: SosSettings,
    pub sessions: SessionSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSettings::from_raw(raw.service),
            api: ApiSettings::from_raw(raw.api),
            sos: SosSettings::from_raw(raw.sos),
            sessions: SessionSettings::from_raw(raw.sessions),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceSettings {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(safeguard_util::socket_path_without_env),
            data_dir: raw
                .data_dir
                .unwrap_or_else(safeguard_util::data_dir_without_env),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Always ends with `/` so relative paths join under it
    pub base_url: String,
    pub request_timeout: Duration,
    pub token_file: PathBuf,
}

impl ApiSettings {
    fn from_raw(raw: RawApiConfig) -> Self {
        let mut base_url = raw.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            base_url,
            request_timeout: Duration::from_secs(
                raw.request_timeout_seconds
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            token_file: raw
                .token_file
                .unwrap_or_else(safeguard_util::default_token_path),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::from_raw(RawApiConfig::default())
    }
}

/// SOS countdown controller settings
#[derive(Debug, Clone)]
pub struct SosSettings {
    pub countdown_seconds: u32,
    pub location_timeout: Duration,
    pub location_grace: Duration,
    pub success_display: Duration,
    pub failure_display: Duration,
    pub cancel_display: Duration,
    pub alert_message: String,
}

impl SosSettings {
    fn from_raw(raw: RawSosConfig) -> Self {
        Self {
            countdown_seconds: raw.countdown_seconds.unwrap_or(DEFAULT_COUNTDOWN_SECS),
            location_timeout: Duration::from_millis(
                raw.location_timeout_ms.unwrap_or(DEFAULT_LOCATION_TIMEOUT_MS),
            ),
            location_grace: Duration::from_millis(
                raw.location_grace_ms.unwrap_or(DEFAULT_LOCATION_GRACE_MS),
            ),
            success_display: Duration::from_secs(
                raw.success_display_seconds
                    .unwrap_or(DEFAULT_SUCCESS_DISPLAY_SECS),
            ),
            failure_display: Duration::from_secs(
                raw.failure_display_seconds
                    .unwrap_or(DEFAULT_FAILURE_DISPLAY_SECS),
            ),
            cancel_display: Duration::from_secs(
                raw.cancel_display_seconds
                    .unwrap_or(DEFAULT_CANCEL_DISPLAY_SECS),
            ),
            alert_message: raw
                .alert_message
                .unwrap_or_else(|| DEFAULT_ALERT_MESSAGE.to_string()),
        }
    }
}

impl Default for SosSettings {
    fn default() -> Self {
        Self::from_raw(RawSosConfig::default())
    }
}

/// Scheduled session engine settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tick_interval: Duration,
    pub start_tolerance: Duration,
    pub retry_interval: Duration,
    pub update_interval_seconds: u32,
    pub max_duration_minutes: u32,
    pub start_message: String,
    pub delay_message: String,
    pub escalation_message: String,
}

impl SessionSettings {
    fn from_raw(raw: RawSessionsConfig) -> Self {
        Self {
            tick_interval: Duration::from_secs(
                raw.tick_interval_seconds
                    .unwrap_or(DEFAULT_TICK_INTERVAL_SECS),
            ),
            start_tolerance: Duration::from_secs(
                raw.start_tolerance_seconds
                    .unwrap_or(DEFAULT_START_TOLERANCE_SECS),
            ),
            retry_interval: Duration::from_secs(
                raw.retry_interval_seconds
                    .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS),
            ),
            update_interval_seconds: raw
                .update_interval_seconds
                .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS),
            max_duration_minutes: raw
                .max_duration_minutes
                .unwrap_or(DEFAULT_MAX_DURATION_MINUTES),
            start_message: raw
                .start_message
                .unwrap_or_else(|| DEFAULT_START_MESSAGE.to_string()),
            delay_message: raw
                .delay_message
                .unwrap_or_else(|| DEFAULT_DELAY_MESSAGE.to_string()),
            escalation_message: raw
                .escalation_message
                .unwrap_or_else(|| DEFAULT_ESCALATION_MESSAGE.to_string()),
        }
    }

    /// Fill a message template with the session name
    pub fn render(template: &str, session_name: &str) -> String {
        template.replace("{name}", session_name)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_raw(RawSessionsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.sos.countdown_seconds, 5);
        assert_eq!(settings.sos.cancel_display, Duration::from_secs(3));
        assert_eq!(settings.sos.success_display, Duration::from_secs(8));
        assert_eq!(settings.sos.failure_display, Duration::from_secs(10));
        assert_eq!(settings.sessions.tick_interval, Duration::from_secs(30));
        assert_eq!(settings.sessions.retry_interval, Duration::from_secs(60));
        assert_eq!(settings.sessions.max_duration_minutes, 480);
        assert!(settings.api.base_url.ends_with('/'));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let api = ApiSettings::from_raw(RawApiConfig {
            base_url: Some("https://api.example.org/v2".into()),
            ..Default::default()
        });
        assert_eq!(api.base_url, "https://api.example.org/v2/");
    }

    #[test]
    fn render_template() {
        assert_eq!(
            SessionSettings::render(DEFAULT_DELAY_MESSAGE, "Walk home"),
            "Walk home has not confirmed arrival on time."
        );
    }
}
