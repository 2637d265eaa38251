//! Store trait definitions

use chrono::{DateTime, Utc};
use safeguard_api::Completion;
use safeguard_util::SessionId;

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Enforcement bookkeeping

    /// Bookkeeping for one session, if any was saved
    fn load_enforcement(&self, session_id: SessionId) -> StoreResult<Option<EnforcementRecord>>;

    /// All saved bookkeeping records
    fn load_all_enforcement(&self) -> StoreResult<Vec<EnforcementRecord>>;

    /// Insert or replace the record for `record.session_id`
    fn save_enforcement(&self, record: &EnforcementRecord) -> StoreResult<()>;

    /// Drop records for sessions the backend no longer reports
    fn delete_enforcement(&self, session_id: SessionId) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Which notices and escalations were delivered for a session
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EnforcementRecord {
    pub session_id: SessionId,
    pub start_notified: bool,
    pub delay_notified: bool,
    pub escalated: bool,
    pub completion: Option<Completion>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl EnforcementRecord {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            start_notified: false,
            delay_notified: false,
            escalated: false,
            completion: None,
            last_attempt_at: None,
        }
    }
}
