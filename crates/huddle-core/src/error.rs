//! Error types for the session state machine.

use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

/// Errors that can occur during session state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation not permitted in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: SessionState,
        /// Operation that was attempted
        operation: String,
    },

    /// Handshake did not complete within timeout
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },
}

impl SessionError {
    /// Returns true if the client may succeed by reconnecting.
    ///
    /// A handshake timeout is usually a slow network. An invalid transition
    /// means the peer does not follow the protocol.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. })
    }
}
