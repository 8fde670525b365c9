//! Driver error types.
//!
//! Errors returned by [`crate::ServerDriver::process_event`]. None of them is
//! fatal to the hub: the runtime logs the error against the connection and
//! keeps serving everyone else.

use std::fmt;

use huddle_core::SessionError;
use huddle_proto::ConnectionId;

/// Errors that can occur while the driver processes an event.
#[derive(Debug)]
pub enum DriverError {
    /// Event names a connection the driver never accepted or already dropped.
    ///
    /// Usually a race between a frame and the connection closing. Transient.
    ConnectionNotFound(ConnectionId),

    /// `ConnectionAccepted` for an id that is already tracked.
    ///
    /// Connection ids must be unique for the lifetime of the process. This is
    /// a runtime bug.
    ConnectionAlreadyExists(ConnectionId),

    /// Session state machine refused a transition.
    Session {
        /// Connection the session belongs to
        connection_id: ConnectionId,
        /// Underlying state machine error
        source: SessionError,
    },
}

impl DriverError {
    /// Connection the error concerns.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Self::ConnectionNotFound(id) | Self::ConnectionAlreadyExists(id) => *id,
            Self::Session { connection_id, .. } => *connection_id,
        }
    }

    /// Error is expected to go away on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionNotFound(_) => true,
            Self::ConnectionAlreadyExists(_) => false,
            Self::Session { source, .. } => source.is_transient(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionNotFound(id) => write!(f, "connection not found: {id}"),
            Self::ConnectionAlreadyExists(id) => write!(f, "connection already exists: {id}"),
            Self::Session { connection_id, source } => {
                write!(f, "session error on connection {connection_id}: {source}")
            },
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use huddle_core::SessionState;

    use super::*;

    #[test]
    fn display_includes_connection() {
        let err = DriverError::ConnectionNotFound(ConnectionId::new(0xab));
        assert_eq!(err.to_string(), "connection not found: 00000000000000ab");
        assert_eq!(err.connection_id(), ConnectionId::new(0xab));
        assert!(err.is_transient());
    }

    #[test]
    fn session_error_is_source() {
        let err = DriverError::Session {
            connection_id: ConnectionId::new(1),
            source: SessionError::InvalidState {
                state: SessionState::Closed,
                operation: "joinGroup".to_string(),
            },
        };

        assert!(err.source().is_some());
        assert!(err.to_string().contains("joinGroup"));
    }

    #[test]
    fn duplicate_connection_is_not_transient() {
        assert!(!DriverError::ConnectionAlreadyExists(ConnectionId::new(1)).is_transient());
    }
}
