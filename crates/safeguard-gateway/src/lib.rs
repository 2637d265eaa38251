//! Collaborator interfaces for safeguard
//!
//! This crate defines the seams between the engines and the outside world:
//! alert dispatch, the scheduled-session backend, location and credentials.
//! It contains no HTTP code itself; see `safeguard-http`.

mod error;
mod location;
mod mock;
mod traits;

pub use error::*;
pub use location::*;
pub use mock::*;
pub use traits::*;
