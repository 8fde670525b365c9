//! Deterministic simulation harness for the Huddle hub.
//!
//! [`SimHub`] drives a real [`huddle_server::ServerDriver`] synchronously:
//! actions are executed in place, deliveries land in per-connection inboxes,
//! and storage work runs inline (or is held back to exercise races). Time
//! and randomness come from [`SimEnv`], so every run with the same seed is
//! identical.
//!
//! # Operation-based testing
//!
//! [`Operation`] is a small alphabet of client and collaborator actions that
//! proptest and the fuzzers generate at random. After each operation the
//! [`invariants`] are checked against the driver state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod operation;
pub mod sim_env;
pub mod sim_hub;

pub use invariants::{InvariantResult, Violation, check_all};
pub use operation::{Operation, USER_COUNT, token_for, user_for};
pub use sim_env::SimEnv;
pub use sim_hub::{CloseRecord, SimHub};
