//! HTTP collaborators for safeguardd
//!
//! Provides:
//! - `HttpBackend`: alert dispatch and scheduled-session CRUD over the REST API
//! - Response classification into `GatewayError`
//! - Static and file-backed bearer credentials

mod classify;
mod client;
mod credentials;
mod dto;

pub use classify::*;
pub use client::*;
pub use credentials::*;
pub use dto::*;
