//! Per-connection session state machine.
//!
//! Every accepted connection gets a `Session`. It authenticates exactly once,
//! from the first frame, and never changes identity afterwards. Like the rest
//! of the core it is pure: callers pass time in and act on the result.
//!
//! # State Machine
//!
//! ```text
//! ┌────────────┐  credential ok   ┌───────────────┐
//! │ Connecting │─────────────────>│ Authenticated │
//! └────────────┘                  └───────────────┘
//!       │                                 │
//!       │ bad credential / timeout        │ disconnect
//!       ↓                                 ↓
//!   ┌────────┐                       ┌────────┐
//!   │ Closed │                       │ Closed │
//!   └────────┘                       └────────┘
//! ```
//!
//! `Closed` is terminal. Only a session that reached `Authenticated` owns
//! registry entries, so [`Session::close`] reports the user it was bound to
//! and nothing otherwise.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use huddle_proto::{ConnectionId, UserId};

use crate::error::SessionError;

/// Time allowed between accept and a valid credential.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no credential yet
    Connecting,
    /// Credential accepted, user identity bound
    Authenticated,
    /// Terminal
    Closed,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for presenting a credential
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT }
    }
}

/// Session state machine for one connection.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing.
#[derive(Debug, Clone)]
pub struct Session<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    connection_id: ConnectionId,
    state: SessionState,
    user_id: Option<UserId>,
    created_at: I,
    config: SessionConfig,
}

impl<I> Session<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new session in [`SessionState::Connecting`].
    pub fn new(connection_id: ConnectionId, now: I, config: SessionConfig) -> Self {
        Self {
            connection_id,
            state: SessionState::Connecting,
            user_id: None,
            created_at: now,
            config,
        }
    }

    /// Connection this session belongs to.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bound user. `None` before authentication; retained after close.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// When the connection was accepted.
    #[must_use]
    pub fn created_at(&self) -> I {
        self.created_at
    }

    /// Bind the session to an authenticated identity.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless the session is `Connecting`
    pub fn authenticate(&mut self, user_id: UserId) -> Result<(), SessionError> {
        if self.state != SessionState::Connecting {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "authenticate".to_string(),
            });
        }

        self.user_id = Some(user_id);
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// The bound user, for operations that require authentication.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless the session is `Authenticated`
    pub fn authenticated_user(&self, operation: &str) -> Result<&UserId, SessionError> {
        match (self.state, &self.user_id) {
            (SessionState::Authenticated, Some(user_id)) => Ok(user_id),
            _ => Err(SessionError::InvalidState {
                state: self.state,
                operation: operation.to_string(),
            }),
        }
    }

    /// Transition to `Closed`.
    ///
    /// Returns the user if the session was authenticated, i.e. if the caller
    /// has registry state to clean up. Closing twice returns `None` the
    /// second time.
    pub fn close(&mut self) -> Option<UserId> {
        let was_authenticated = self.state == SessionState::Authenticated;
        self.state = SessionState::Closed;

        if was_authenticated { self.user_id.clone() } else { None }
    }

    /// Elapsed time if the handshake window has passed without a credential.
    #[must_use]
    pub fn check_handshake_timeout(&self, now: I) -> Option<Duration> {
        if self.state != SessionState::Connecting {
            return None;
        }

        let elapsed = now - self.created_at;
        if elapsed > self.config.handshake_timeout { Some(elapsed) } else { None }
    }
}
