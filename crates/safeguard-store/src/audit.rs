//! Audit event types

use chrono::{DateTime, Utc};
use safeguard_api::{AlertFailure, AlertKind, Completion, SessionStatus};
use safeguard_util::{CycleId, SessionId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Session confirmed by the backend and tracked locally
    SessionCreated {
        session_id: SessionId,
        session_name: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },

    /// One edge of the session status graph
    SessionTransition {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        completion: Option<Completion>,
    },

    /// Start or delay notice delivered
    NoticeDelivered {
        session_id: SessionId,
        kind: AlertKind,
        contacts_notified: u32,
    },

    /// Escalation alert delivered for an overdue session
    SessionEscalated {
        session_id: SessionId,
        contacts_notified: u32,
    },

    /// Any alert dispatch that failed
    DispatchFailed {
        session_id: Option<SessionId>,
        kind: AlertKind,
        failure: AlertFailure,
    },

    SosTriggered { cycle: CycleId },

    SosCancelled { cycle: CycleId, remaining: u32 },

    SosDelivered {
        cycle: CycleId,
        contacts_notified: u32,
        with_location: bool,
    },

    /// Client connected
    ClientConnected { client_id: String },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    pub timestamp: DateTime<Utc>,

    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(safeguard_util::now(), event)
    }

    /// Event stamped with an engine clock reading
    pub fn at(timestamp: DateTime<Utc>, event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
