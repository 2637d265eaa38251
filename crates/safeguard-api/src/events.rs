//! Event types for safeguardd -> client streaming

use chrono::{DateTime, Utc};
use safeguard_util::{CycleId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{AlertFailure, AlertKind, Completion, SessionStatus, SosSnapshot, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: safeguard_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// SOS controller moved to a new state
    SosStateChanged(SosSnapshot),

    /// One countdown second elapsed
    SosCountdown { cycle: CycleId, remaining: u32 },

    SosDelivered {
        cycle: CycleId,
        contacts_notified: u32,
    },

    SosFailed {
        cycle: CycleId,
        failure: AlertFailure,
        message: String,
    },

    SessionCreated {
        session_id: SessionId,
        session_name: String,
        start_time: DateTime<Utc>,
    },

    SessionStatusChanged {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        completion: Option<Completion>,
    },

    /// Start or delay notice delivered to contacts
    SessionNoticeSent {
        session_id: SessionId,
        kind: AlertKind,
        contacts_notified: u32,
    },

    SessionEscalated {
        session_id: SessionId,
        contacts_notified: u32,
    },

    /// A timer-driven dispatch failed and will be retried
    SessionDispatchFailed {
        session_id: SessionId,
        kind: AlertKind,
        failure: AlertFailure,
    },

    SessionsRefreshed { count: usize },

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::SessionStatusChanged {
            session_id: SessionId::new(3),
            from: SessionStatus::Active,
            to: SessionStatus::Completed,
            completion: Some(Completion::Escalated),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session_status_changed"));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.payload,
            EventPayload::SessionStatusChanged {
                completion: Some(Completion::Escalated),
                ..
            }
        ));
    }
}
