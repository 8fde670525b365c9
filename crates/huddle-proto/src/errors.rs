//! Protocol errors.

use thiserror::Error;

/// Errors produced while framing or (de)serializing wire events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ended before the length prefix or body was complete
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Declared or encoded body exceeds [`crate::codec::MAX_FRAME_SIZE`]
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Body size in bytes
        size: usize,
        /// Maximum permitted body size
        max: usize,
    },

    /// Trailing bytes after the declared body
    #[error("frame length mismatch: prefix declares {declared} bytes, buffer holds {actual}")]
    LengthMismatch {
        /// Body length from the prefix
        declared: usize,
        /// Body length actually present
        actual: usize,
    },

    /// CBOR serialization failed
    #[error("CBOR encoding failed: {0}")]
    Encode(String),

    /// CBOR deserialization failed (malformed body or unknown event)
    #[error("CBOR decoding failed: {0}")]
    Decode(String),
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
