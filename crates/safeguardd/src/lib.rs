//! safeguardd service library
//!
//! Wires the engines to the IPC server. The `safeguardd` binary builds the
//! HTTP collaborators and runs a [`Service`] until a signal arrives.

mod handler;
mod service;

pub use handler::*;
pub use service::*;
