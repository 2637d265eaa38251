//! Shared types for the safeguard API

use chrono::{DateTime, Utc};
use safeguard_util::{CycleId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude within [-90, 90], longitude within [-180, 180], both finite
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

/// Where a scheduled session is headed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// Notification policy fixed when a session is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyPolicy {
    pub on_start: bool,
    pub on_arrival: bool,
    pub on_delay: bool,
    pub auto_alert_if_not_arrived: bool,
}

impl Default for NotifyPolicy {
    fn default() -> Self {
        Self {
            on_start: true,
            on_arrival: true,
            on_delay: true,
            auto_alert_if_not_arrived: false,
        }
    }
}

/// Lifecycle status of a scheduled session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Allowed edges: Scheduled→{Active,Cancelled}, Active→{Completed,Cancelled}
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Scheduled, Active) | (Scheduled, Cancelled) | (Active, Completed) | (Active, Cancelled)
        )
    }

    /// Statuses to pass through to reach `target` along allowed edges,
    /// excluding `self`. Empty if `target` is unreachable or equal.
    pub fn path_to(&self, target: SessionStatus) -> Vec<SessionStatus> {
        if self.can_transition_to(target) {
            return vec![target];
        }
        if *self == SessionStatus::Scheduled && target == SessionStatus::Completed {
            return vec![SessionStatus::Active, SessionStatus::Completed];
        }
        Vec::new()
    }

    /// Parse the backend's status string (`"SCHEDULED"`, `"active"`, ...)
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" | "PENDING" => Some(SessionStatus::Scheduled),
            "ACTIVE" | "IN_PROGRESS" => Some(SessionStatus::Active),
            "COMPLETED" | "ARRIVED" => Some(SessionStatus::Completed),
            "CANCELLED" | "CANCELED" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "SCHEDULED",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Scheduled => "Scheduled",
            SessionStatus::Active => "Active",
            SessionStatus::Completed => "Completed",
            SessionStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

/// How a Completed session got there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// User confirmed arrival
    Arrived,
    /// End time passed without arrival and contacts were alerted
    Escalated,
}

/// Request to create a scheduled session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub destination: Option<Destination>,
    #[serde(default)]
    pub notify: NotifyPolicy,
    /// Location update cadence requested from the backend
    #[serde(default)]
    pub update_interval_seconds: Option<u32>,
}

/// A scheduled session as confirmed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub id: SessionId,
    pub session_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub destination: Option<Destination>,
    pub notify: NotifyPolicy,
    pub status: SessionStatus,
}

impl ScheduledSession {
    /// `start_time + duration_minutes`
    pub fn computed_end_time(start_time: DateTime<Utc>, duration_minutes: u32) -> DateTime<Utc> {
        start_time + chrono::Duration::minutes(i64::from(duration_minutes))
    }
}

/// Session plus local enforcement state, as shown to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session: ScheduledSession,
    pub completion: Option<Completion>,
    pub start_notified: bool,
    pub delay_notified: bool,
    pub escalated: bool,
}

/// Kind of outbound alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Sos,
    SessionStart,
    SessionDelay,
    SessionEscalation,
}

impl AlertKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            AlertKind::Sos => "SOS",
            AlertKind::SessionStart => "SESSION_START",
            AlertKind::SessionDelay => "SESSION_DELAY",
            AlertKind::SessionEscalation => "SESSION_ESCALATION",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Body of an outbound alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub message: String,
    pub location: Option<Coordinates>,
    /// Session the alert concerns, for session notices and escalations
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

/// Backend acknowledgment of a dispatched alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub contacts_notified: u32,
}

/// Classified reason an alert could not be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertFailure {
    NoContactsConfigured,
    AuthExpired,
    ServiceUnavailable,
    NetworkUnreachable,
    Unknown,
}

impl AlertFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AlertFailure::NoContactsConfigured => "Please add emergency contacts first!",
            AlertFailure::AuthExpired => "Your login has expired. Please sign in again.",
            AlertFailure::ServiceUnavailable => {
                "The alert service is unavailable right now. Call emergency services directly."
            }
            AlertFailure::NetworkUnreachable => {
                "No connection. The alert could not be sent. Call emergency services directly."
            }
            AlertFailure::Unknown => "Failed to send alert.",
        }
    }
}

/// Status of the SOS controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SosStatus {
    Idle,
    CountingDown,
    Dispatching,
    Active,
    Cancelled,
    Failed,
}

/// Point-in-time view of the SOS controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosSnapshot {
    pub status: SosStatus,
    pub cycle: Option<CycleId>,
    pub countdown_remaining: u32,
    pub location: Option<Coordinates>,
    pub started_at: Option<DateTime<Utc>>,
    pub contacts_notified: Option<u32>,
    pub failure: Option<AlertFailure>,
    /// User-facing message for the current state, if any
    pub message: Option<String>,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub store_ok: bool,
    pub session_count: usize,
}
