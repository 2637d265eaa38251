//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub api: RawApiConfig,

    #[serde(default)]
    pub sos: RawSosConfig,

    #[serde(default)]
    pub sessions: RawSessionsConfig,
}

/// Host daemon settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/safeguard/safeguardd.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the audit store
    pub data_dir: Option<PathBuf>,
}

/// Remote backend settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawApiConfig {
    /// Base URL, e.g. `https://safety.example.org/`
    pub base_url: Option<String>,

    pub request_timeout_seconds: Option<u64>,

    /// File holding the bearer token
    pub token_file: Option<PathBuf>,
}

/// SOS countdown settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSosConfig {
    pub countdown_seconds: Option<u32>,

    /// Bounded wait for a fresh location fix
    pub location_timeout_ms: Option<u64>,

    /// How long dispatch waits for a pending location once the countdown ends
    pub location_grace_ms: Option<u64>,

    pub success_display_seconds: Option<u64>,
    pub failure_display_seconds: Option<u64>,
    pub cancel_display_seconds: Option<u64>,

    pub alert_message: Option<String>,
}

/// Scheduled session enforcement settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessionsConfig {
    /// Periodic evaluation interval
    pub tick_interval_seconds: Option<u64>,

    /// How far in the past a new session may start
    pub start_tolerance_seconds: Option<u64>,

    /// Minimum spacing between attempts of the same notice
    pub retry_interval_seconds: Option<u64>,

    /// Location update cadence requested from the backend
    pub update_interval_seconds: Option<u32>,

    pub max_duration_minutes: Option<u32>,

    /// Templates; `{name}` is replaced by the session name
    pub start_message: Option<String>,
    pub delay_message: Option<String>,
    pub escalation_message: Option<String>,
}
