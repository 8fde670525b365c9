//! Storage error types.

use thiserror::Error;

/// Errors from storage backends.
///
/// `Clone` because results travel back into the driver inside events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O or transaction failure. May be transient.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored bytes could not be decoded. Indicates corruption.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}
