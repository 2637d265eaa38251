//! Core events emitted by the engines

use chrono::{DateTime, Utc};
use safeguard_api::{
    AlertFailure, AlertKind, Completion, EventPayload, SessionStatus, SosSnapshot,
};
use safeguard_util::{CycleId, SessionId};
use tokio::sync::broadcast;

/// Events emitted by the SOS controller and the session engine
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// SOS controller entered a new state
    SosStateChanged(SosSnapshot),

    /// Countdown second elapsed
    SosCountdown { cycle: CycleId, remaining: u32 },

    SosDelivered {
        cycle: CycleId,
        contacts_notified: u32,
    },

    SosFailed {
        cycle: CycleId,
        failure: AlertFailure,
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

    /// Start or delay notice delivered
    SessionNoticeSent {
        session_id: SessionId,
        kind: AlertKind,
        contacts_notified: u32,
    },

    SessionEscalated {
        session_id: SessionId,
        contacts_notified: u32,
    },

    /// Timer-driven dispatch failed; retried on a later pass
    SessionDispatchFailed {
        session_id: SessionId,
        kind: AlertKind,
        failure: AlertFailure,
    },

    SessionsRefreshed { count: usize },
}

/// Capacity of the engine event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Create the broadcast channel the engines publish on
pub fn event_channel() -> (broadcast::Sender<CoreEvent>, broadcast::Receiver<CoreEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

impl From<CoreEvent> for EventPayload {
    fn from(event: CoreEvent) -> Self {
        match event {
            CoreEvent::SosStateChanged(snapshot) => EventPayload::SosStateChanged(snapshot),
            CoreEvent::SosCountdown { cycle, remaining } => {
                EventPayload::SosCountdown { cycle, remaining }
            }
            CoreEvent::SosDelivered {
                cycle,
                contacts_notified,
            } => EventPayload::SosDelivered {
                cycle,
                contacts_notified,
            },
            CoreEvent::SosFailed { cycle, failure } => EventPayload::SosFailed {
                cycle,
                failure,
                message: failure.message().to_string(),
            },
            CoreEvent::SessionCreated {
                session_id,
                session_name,
                start_time,
            } => EventPayload::SessionCreated {
                session_id,
                session_name,
                start_time,
            },
            CoreEvent::SessionStatusChanged {
                session_id,
                from,
                to,
                completion,
            } => EventPayload::SessionStatusChanged {
                session_id,
                from,
                to,
                completion,
            },
            CoreEvent::SessionNoticeSent {
                session_id,
                kind,
                contacts_notified,
            } => EventPayload::SessionNoticeSent {
                session_id,
                kind,
                contacts_notified,
            },
            CoreEvent::SessionEscalated {
                session_id,
                contacts_notified,
            } => EventPayload::SessionEscalated {
                session_id,
                contacts_notified,
            },
            CoreEvent::SessionDispatchFailed {
                session_id,
                kind,
                failure,
            } => EventPayload::SessionDispatchFailed {
                session_id,
                kind,
                failure,
            },
            CoreEvent::SessionsRefreshed { count } => EventPayload::SessionsRefreshed { count },
        }
    }
}
