//! Huddle wire protocol.
//!
//! Everything that crosses the transport boundary lives here: identifiers,
//! the events clients send, the events the server fans out, and the
//! length-prefixed CBOR framing used on every stream.
//!
//! # Wire shape
//!
//! Both directions use the same envelope, `{ "event": <name>, "payload": ... }`,
//! encoded as CBOR and prefixed with a 4-byte big-endian body length. Field
//! names inside payloads are camelCase.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod close;
pub mod codec;
mod errors;
mod event;
mod ids;

pub use client::{ChatRef, ClientEvent, GroupRead, GroupRef, Hello, TypingSignal};
pub use close::CloseCode;
pub use errors::{ProtocolError, Result};
pub use event::{AuthErrorNotice, Connected, Event, ReadNotice, TypingNotice, names};
pub use ids::{ConnectionId, RoomId, UserId};

/// ALPN protocol identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"huddle";
