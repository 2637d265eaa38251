//! Persistence layer for safeguardd
//!
//! Provides:
//! - Audit log (append-only)
//! - Per-session enforcement bookkeeping, so a restart neither repeats a
//!   start notice nor escalates a session twice

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use safeguard_util::SafeguardError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for SafeguardError {
    fn from(e: StoreError) -> Self {
        SafeguardError::store(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
