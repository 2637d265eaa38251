//! Core engines for safeguardd
//!
//! This crate is the heart of safeguardd, containing:
//! - The SOS countdown controller (Idle -> CountingDown -> Dispatching -> Active/Failed)
//! - The scheduled session engine (Scheduled -> Active -> Completed/Cancelled)
//! - Start/delay notices and overdue escalation
//! - The timer loop that drives session evaluation

mod engine;
mod events;
mod services;
mod session;
mod sos;
mod sos_controller;
mod timer;

pub use engine::*;
pub use events::*;
pub use services::*;
pub use session::*;
pub use sos::*;
pub use sos_controller::*;
pub use timer::*;
