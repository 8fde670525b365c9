//! Application close codes carried in the QUIC `CONNECTION_CLOSE` frame.

/// Reason a connection was closed by the server.
///
/// The numeric value is sent as the QUIC application error code, so clients
/// can tell an authentication rejection apart from an ordinary shutdown
/// without parsing the reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CloseCode {
    /// Graceful close
    Normal = 0,
    /// Credential missing, invalid or expired at handshake
    AuthFailed = 1,
    /// No credential presented within the handshake window
    HandshakeTimeout = 2,
    /// Peer sent a frame that could not be decoded
    ProtocolError = 3,
    /// Server is at its connection limit
    ServerFull = 4,
}

impl CloseCode {
    /// Numeric application error code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Parse a numeric code. `None` for codes this version does not define.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Normal),
            1 => Some(Self::AuthFailed),
            2 => Some(Self::HandshakeTimeout),
            3 => Some(Self::ProtocolError),
            4 => Some(Self::ServerFull),
            _ => None,
        }
    }
}
