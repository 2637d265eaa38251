//! Command types for the safeguardd protocol

use safeguard_util::{ClientId, SafeguardError, SessionId};
use serde::{Deserialize, Serialize};

use crate::{Coordinates, HealthStatus, SessionRequest, SessionView, SosSnapshot, API_VERSION};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    /// Classified, user-facing message
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&SafeguardError> for ErrorInfo {
    fn from(err: &SafeguardError) -> Self {
        let code = match err {
            SafeguardError::Validation(_) => ErrorCode::ValidationFailed,
            SafeguardError::NotFound(_) => ErrorCode::NotFound,
            SafeguardError::InvalidState(_) => ErrorCode::InvalidState,
            SafeguardError::Network(_) => ErrorCode::NetworkError,
            SafeguardError::AuthExpired => ErrorCode::AuthExpired,
            SafeguardError::Server { .. } => ErrorCode::ServerError,
            SafeguardError::NoContactsConfigured => ErrorCode::NoContactsConfigured,
            SafeguardError::Store(_) | SafeguardError::Config(_) | SafeguardError::Internal(_) => {
                ErrorCode::InternalError
            }
        };
        Self::new(code, err.user_message())
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    ValidationFailed,
    NotFound,
    InvalidState,
    NetworkError,
    AuthExpired,
    ServerError,
    NoContactsConfigured,
    RateLimited,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Current SOS controller state
    GetSosState,

    /// Start an SOS countdown
    TriggerSos,

    /// Cancel the running SOS countdown
    CancelSos,

    /// Feed a position fix from the client device
    ReportLocation { location: Coordinates },

    /// Cached sessions with enforcement state
    ListSessions,

    CreateSession { request: SessionRequest },

    MarkArrived { session_id: SessionId },

    CancelSession { session_id: SessionId },

    /// Re-fetch sessions from the backend
    RefreshSessions,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Sos(SosSnapshot),
    Sessions(Vec<SessionView>),
    Session(SessionView),
    LocationAccepted,
    Subscribed { client_id: ClientId },
    Health(HealthStatus),
    Pong,
}
