//! Huddle core: pure logic shared by the server runtime and the simulation
//! harness.
//!
//! Nothing in this crate performs I/O. Time and randomness come in through
//! the [`env::Environment`] trait so the same state machines run against the
//! system clock in production and a virtual clock in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod session;

pub use env::Environment;
pub use error::SessionError;
pub use session::{DEFAULT_HANDSHAKE_TIMEOUT, Session, SessionConfig, SessionState};
