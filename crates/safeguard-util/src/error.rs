//! Error types for safeguard

use thiserror::Error;

use crate::SessionId;

/// Core error type for safeguard operations
///
/// Every variant maps to a short user-facing message via
/// [`SafeguardError::user_message`]; raw transport strings stay in the
/// `Display` output for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafeguardError {
    /// Bad input, rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transient transport failure (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Credential rejected; requires re-authentication
    #[error("Authentication expired")]
    AuthExpired,

    /// Backend 5xx (retryable with backoff)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("No emergency contacts configured")]
    NoContactsConfigured,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SafeguardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the engine may retry the failed operation on its own
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }

    /// Short classified message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(_) => "This session no longer exists.".into(),
            Self::InvalidState(msg) => msg.clone(),
            Self::Network(_) => "No connection. Check your network and try again.".into(),
            Self::AuthExpired => "Your login has expired. Please sign in again.".into(),
            Self::Server { .. } => "The safety service is unavailable. Try again shortly.".into(),
            Self::NoContactsConfigured => "Please add emergency contacts first!".into(),
            Self::Store(_) | Self::Config(_) | Self::Internal(_) => {
                "Something went wrong. Please try again.".into()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SafeguardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SafeguardError::network("timeout").is_retryable());
        assert!(
            SafeguardError::Server {
                status: 503,
                message: "down".into()
            }
            .is_retryable()
        );
        assert!(!SafeguardError::AuthExpired.is_retryable());
        assert!(!SafeguardError::validation("bad").is_retryable());
    }

    #[test]
    fn user_message_hides_transport_detail() {
        let err = SafeguardError::network("error sending request for url (http://10.0.2.2:8080/)");
        assert!(!err.user_message().contains("10.0.2.2"));
    }
}
