//! Weather session orchestration for Nimbus
//!
//! A [`SessionController`] owns the session state: which position is shown,
//! the weather for it, the unit, and the last error. Every operation
//! replaces the state wholesale with a new [`SessionSnapshot`].

pub mod bridge;
pub mod controller;
pub mod error;
pub mod error_mapping;
pub mod state;

pub use controller::SessionController;
pub use error::SessionError;
pub use state::{SessionPhase, SessionSnapshot};
