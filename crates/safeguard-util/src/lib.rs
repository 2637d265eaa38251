//! Shared utilities for safeguard
//!
//! This crate provides:
//! - ID types (SessionId, CycleId, ClientId)
//! - Clocks (system clock with mock-time support, manual clock for tests)
//! - The error taxonomy surfaced to callers
//! - Retry throttling and rate limiting helpers
//! - Default paths for socket, data, config and token files

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
