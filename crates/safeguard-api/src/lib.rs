//! Protocol types for safeguard
//!
//! This crate defines the data model shared by the engines, the HTTP
//! collaborators and local IPC clients:
//! - Sessions, alerts and SOS state
//! - Commands and responses (client -> safeguardd)
//! - Events (safeguardd -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
