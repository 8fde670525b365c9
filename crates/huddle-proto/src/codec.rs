//! Length-prefixed CBOR framing.
//!
//! Layout: `[body_len: u32 big-endian][body: CBOR]`.
//!
//! Inbound client frames are capped at [`MAX_FRAME_SIZE`]; the prefix is
//! checked before any body bytes are read, so a peer cannot make the server
//! allocate an arbitrary buffer. Outbound server events are only bounded by
//! what the prefix can express ([`MAX_EVENT_SIZE`]): a `getOnlineUsers` list
//! grows with the number of online users and must never be dropped.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum body size of a client frame (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Maximum body size of a server event: the largest length the prefix holds.
pub const MAX_EVENT_SIZE: usize = u32::MAX as usize;

/// Encode a message into a complete frame (prefix + body).
///
/// # Errors
///
/// - `ProtocolError::Encode` if CBOR serialization fails
/// - `ProtocolError::FrameTooLarge` if the body exceeds [`MAX_EVENT_SIZE`]
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    let mut body = Vec::with_capacity(128);
    ciborium::into_writer(message, &mut body).map_err(|e| ProtocolError::Encode(e.to_string()))?;

    let len = u32::try_from(body.len())
        .map_err(|_| ProtocolError::FrameTooLarge { size: body.len(), max: MAX_EVENT_SIZE })?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.put_u32(len);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Validate a client frame's length prefix and return the body length it
/// declares.
///
/// # Errors
///
/// - `ProtocolError::FrameTooLarge` if the declared length exceeds
///   [`MAX_FRAME_SIZE`]
pub fn body_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize> {
    body_len_within(prefix, MAX_FRAME_SIZE)
}

/// [`body_len`] with an explicit cap.
pub fn body_len_within(prefix: [u8; LENGTH_PREFIX_SIZE], max: usize) -> Result<usize> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max {
        return Err(ProtocolError::FrameTooLarge { size: len, max });
    }
    Ok(len)
}

/// Decode a frame body (without prefix).
///
/// # Errors
///
/// - `ProtocolError::Decode` if the body is not valid CBOR for `T`
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    ciborium::from_reader(body).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Decode a complete client frame (prefix + body), capped at
/// [`MAX_FRAME_SIZE`].
///
/// # Errors
///
/// - `ProtocolError::FrameTooShort` if the buffer is shorter than declared
/// - `ProtocolError::LengthMismatch` if bytes remain after the body
/// - any error from [`body_len`] or [`decode_body`]
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    decode_within(frame, MAX_FRAME_SIZE)
}

/// Decode a complete server event frame, capped at [`MAX_EVENT_SIZE`].
pub fn decode_event<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    decode_within(frame, MAX_EVENT_SIZE)
}

fn decode_within<T: DeserializeOwned>(frame: &[u8], max: usize) -> Result<T> {
    let Some((prefix, body)) = frame.split_first_chunk::<LENGTH_PREFIX_SIZE>() else {
        return Err(ProtocolError::FrameTooShort {
            expected: LENGTH_PREFIX_SIZE,
            actual: frame.len(),
        });
    };

    let declared = body_len_within(*prefix, max)?;
    if body.len() < declared {
        return Err(ProtocolError::FrameTooShort {
            expected: LENGTH_PREFIX_SIZE + declared,
            actual: frame.len(),
        });
    }
    if body.len() > declared {
        return Err(ProtocolError::LengthMismatch { declared, actual: body.len() });
    }

    decode_body(body)
}
