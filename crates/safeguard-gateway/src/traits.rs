//! Collaborator traits consumed by the engines

use async_trait::async_trait;
use safeguard_api::{
    AlertKind, AlertPayload, Coordinates, DispatchReceipt, ScheduledSession, SessionRequest,
};
use safeguard_util::SessionId;

use crate::GatewayResult;

/// Notifies the user's emergency contacts
#[async_trait]
pub trait AlertGateway: Send + Sync {
    async fn dispatch(&self, kind: AlertKind, payload: &AlertPayload)
        -> GatewayResult<DispatchReceipt>;
}

/// Remote CRUD surface for scheduled sessions.
///
/// Every call returns the server-confirmed record(s).
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> GatewayResult<ScheduledSession>;

    async fn mark_arrived(&self, session_id: SessionId) -> GatewayResult<ScheduledSession>;

    async fn cancel_session(&self, session_id: SessionId) -> GatewayResult<ScheduledSession>;

    /// All sessions for the current account
    async fn list_sessions(&self) -> GatewayResult<Vec<ScheduledSession>>;
}

/// Best-effort position source
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Cached position, returned without waiting
    async fn last_known(&self) -> GatewayResult<Option<Coordinates>>;

    /// Fresh fix; callers bound the wait themselves
    async fn current_fix(&self) -> GatewayResult<Option<Coordinates>>;
}

/// Supplies the bearer credential for backend calls
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> GatewayResult<String>;
}
