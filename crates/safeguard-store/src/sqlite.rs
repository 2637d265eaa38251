//! SQLite-based store implementation

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use safeguard_api::Completion;
use safeguard_util::SessionId;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, EnforcementRecord, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Per-session enforcement bookkeeping
            CREATE TABLE IF NOT EXISTS enforcement (
                session_id INTEGER PRIMARY KEY,
                start_notified INTEGER NOT NULL DEFAULT 0,
                delay_notified INTEGER NOT NULL DEFAULT 0,
                escalated INTEGER NOT NULL DEFAULT 0,
                completion TEXT,
                last_attempt_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn completion_to_sql(completion: Option<Completion>) -> Option<&'static str> {
    completion.map(|c| match c {
        Completion::Arrived => "arrived",
        Completion::Escalated => "escalated",
    })
}

fn completion_from_sql(raw: Option<String>) -> Option<Completion> {
    match raw.as_deref() {
        Some("arrived") => Some(Completion::Arrived),
        Some("escalated") => Some(Completion::Escalated),
        _ => None,
    }
}

fn enforcement_from_row(row: &Row<'_>) -> rusqlite::Result<EnforcementRecord> {
    let last_attempt: Option<String> = row.get(5)?;
    Ok(EnforcementRecord {
        session_id: SessionId::new(row.get(0)?),
        start_notified: row.get(1)?,
        delay_notified: row.get(2)?,
        escalated: row.get(3)?,
        completion: completion_from_sql(row.get(4)?),
        last_attempt_at: last_attempt.as_deref().and_then(parse_timestamp),
    })
}

const ENFORCEMENT_COLUMNS: &str =
    "session_id, start_notified, delay_notified, escalated, completion, last_attempt_at";

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = parse_timestamp(&timestamp_str).unwrap_or_else(safeguard_util::now);
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn load_enforcement(&self, session_id: SessionId) -> StoreResult<Option<EnforcementRecord>> {
        let conn = self.lock()?;

        let record = conn
            .query_row(
                &format!("SELECT {ENFORCEMENT_COLUMNS} FROM enforcement WHERE session_id = ?"),
                [session_id.get()],
                enforcement_from_row,
            )
            .optional()?;

        Ok(record)
    }

    fn load_all_enforcement(&self) -> StoreResult<Vec<EnforcementRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {ENFORCEMENT_COLUMNS} FROM enforcement ORDER BY session_id"
        ))?;
        let records = stmt
            .query_map([], enforcement_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn save_enforcement(&self, record: &EnforcementRecord) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO enforcement
                (session_id, start_notified, delay_notified, escalated, completion, last_attempt_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id)
            DO UPDATE SET
                start_notified = excluded.start_notified,
                delay_notified = excluded.delay_notified,
                escalated = excluded.escalated,
                completion = excluded.completion,
                last_attempt_at = excluded.last_attempt_at
            "#,
            params![
                record.session_id.get(),
                record.start_notified,
                record.delay_notified,
                record.escalated,
                completion_to_sql(record.completion),
                record.last_attempt_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        debug!(session_id = %record.session_id, "Enforcement record saved");
        Ok(())
    }

    fn delete_enforcement(&self, session_id: SessionId) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM enforcement WHERE session_id = ?",
            [session_id.get()],
        )?;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
