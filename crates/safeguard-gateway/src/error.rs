//! Transport-level errors from external collaborators

use safeguard_api::AlertFailure;
use safeguard_util::{SafeguardError, SessionId};
use thiserror::Error;

/// Errors from gateway, backend, location and credential calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication expired")]
    AuthExpired,

    #[error("Resource not found")]
    NotFound,

    #[error("No emergency contacts configured")]
    NoContacts,

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 4xx other than auth/not-found, usually a validation rejection
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Credentials unavailable: {0}")]
    Credentials(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Classification shown to the user when an alert could not be sent
    pub fn alert_failure(&self) -> AlertFailure {
        match self {
            GatewayError::NoContacts => AlertFailure::NoContactsConfigured,
            GatewayError::AuthExpired | GatewayError::Credentials(_) => AlertFailure::AuthExpired,
            GatewayError::Server { .. } => AlertFailure::ServiceUnavailable,
            GatewayError::Network(_) | GatewayError::Timeout => AlertFailure::NetworkUnreachable,
            GatewayError::NotFound
            | GatewayError::Rejected { .. }
            | GatewayError::Decode(_)
            | GatewayError::LocationUnavailable(_) => AlertFailure::Unknown,
        }
    }

    /// Convert, attributing a 404 to the session the call was about
    pub fn for_session(self, session_id: SessionId) -> SafeguardError {
        match self {
            GatewayError::NotFound => SafeguardError::NotFound(session_id),
            other => other.into(),
        }
    }
}

impl From<GatewayError> for SafeguardError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Network(msg) => SafeguardError::Network(msg),
            GatewayError::Timeout => SafeguardError::network("request timed out"),
            GatewayError::AuthExpired | GatewayError::Credentials(_) => SafeguardError::AuthExpired,
            GatewayError::NoContacts => SafeguardError::NoContactsConfigured,
            GatewayError::Server { status, message } => SafeguardError::Server { status, message },
            GatewayError::Rejected { message, .. } => SafeguardError::Validation(message),
            GatewayError::NotFound => SafeguardError::internal("backend resource not found"),
            GatewayError::Decode(msg) => SafeguardError::internal(format!("bad backend response: {msg}")),
            GatewayError::LocationUnavailable(msg) => SafeguardError::internal(msg),
        }
    }
}
