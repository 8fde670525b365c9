//! Huddle presence and fanout server.
//!
//! Tracks which users are online across any number of connections, keeps
//! per-connection room membership, and delivers server-originated events to
//! connections, users, rooms or everyone.
//!
//! # Architecture
//!
//! The [`ServerDriver`] is Sans-IO: it consumes [`ServerEvent`]s and returns
//! [`ServerAction`]s. The [`Hub`] runs the driver on a single Tokio task and
//! executes those actions (writing to connections, running storage work on
//! the blocking pool). [`Server`] accepts QUIC connections and bridges their
//! streams to the hub.
//!
//! # Components
//!
//! - [`ServerDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`PresencePublisher`]: registry mutations paired with presence broadcasts
//! - [`EventRouter`]: resolves a [`Target`] into recipients
//! - [`Hub`] / [`HubHandle`]: event loop and its cloneable entry point
//! - [`Server`]: QUIC runtime via [`QuinnTransport`]
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod bootstrap;
mod driver;
mod error;
mod handle;
mod hub;
mod presence;
mod registry;
mod rooms;
mod router;
mod server_error;
pub mod storage;
mod system_env;
mod transport;

use std::{path::PathBuf, time::Duration};

pub use auth::{AuthError, Authenticator, StaticTokenAuthenticator};
pub use driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use handle::HubHandle;
use huddle_core::Environment;
use huddle_proto::{ClientEvent, ConnectionId, ProtocolError, codec};
pub use hub::{DEFAULT_TICK_INTERVAL, Hub, Outbound};
pub use presence::{PresencePublisher, PresenceTransition, PresenceUpdate};
use quinn::SendStream;
pub use registry::ConnectionRegistry;
pub use rooms::{LeaveOutcome, RoomMembership};
pub use router::{Delivery, EventRouter, Target};
pub use server_error::DriverError;
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    task::JoinHandle,
};
pub use transport::{QuinnConnection, QuinnTransport};

/// How long a closing connection may take to flush its outbound stream.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<PathBuf>,
    /// Driver configuration (timeouts, limits)
    pub driver: DriverConfig,
    /// Interval between handshake-timeout sweeps
    pub tick_interval: Duration,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Production Huddle server.
///
/// Owns the QUIC endpoint and the hub task.
pub struct Server {
    transport: QuinnTransport,
    hub: HubHandle,
    hub_task: JoinHandle<()>,
    env: SystemEnv,
}

impl Server {
    /// Bind the endpoint and start the hub.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn bind<A, S>(
        config: ServerRuntimeConfig,
        authenticator: A,
        storage: S,
    ) -> Result<Self, ServerError>
    where
        A: Authenticator,
        S: Storage,
    {
        let env = SystemEnv::new();
        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        let driver = ServerDriver::new(env.clone(), authenticator, config.driver);
        let (hub, hub_task) = Hub::new(driver, storage, config.tick_interval).spawn();

        Ok(Self { transport, hub, hub_task, env })
    }

    /// Handle for the messaging collaborator.
    pub fn handle(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Accept connections until the endpoint closes or the hub stops.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(addr = %self.transport.local_addr()?, "server starting");

        loop {
            if self.hub_task.is_finished() {
                return Err(ServerError::HubClosed);
            }

            match self.transport.accept().await {
                Ok(Some(conn)) => {
                    let hub = self.hub.clone();
                    let connection_id = ConnectionId::new(self.env.random_u64());

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(connection_id, conn, hub).await {
                            tracing::warn!(%connection_id, error = %e, "connection error");
                        }
                    });
                },
                Ok(None) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "accept error");
                },
            }
        }
    }
}

/// Bridge one QUIC connection to the hub.
async fn handle_connection(
    connection_id: ConnectionId,
    conn: QuinnConnection,
    hub: HubHandle,
) -> Result<(), ServerError> {
    tracing::debug!(%connection_id, remote = %conn.remote_addr(), "new connection");

    let send = conn.open_uni().await?;
    let outbound = hub.connection_opened(connection_id)?;
    tokio::spawn(write_outbound(connection_id, conn.clone(), send, outbound));

    let reason = loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                // Clients only send on their streams.
                drop(send);
                tokio::spawn(read_stream(connection_id, recv, hub.clone()));
            },
            Err(e) => break e.to_string(),
        }
    };

    tracing::debug!(%connection_id, %reason, "connection closed");
    hub.connection_closed(connection_id, reason)
}

/// Drain a connection's outbound channel into its event stream, in order.
///
/// Ends when the hub forgets the connection or asks for a close.
async fn write_outbound(
    connection_id: ConnectionId,
    conn: QuinnConnection,
    mut send: SendStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(e) = send.write_all(&frame).await {
                    tracing::debug!(%connection_id, error = %e, "outbound write failed");
                    break;
                }
            },
            Outbound::Close { code, reason } => {
                let _ = send.finish();
                let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, send.stopped()).await;
                conn.close(code, &reason);
                break;
            },
        }
    }
}

/// Read length-prefixed client events from one stream.
///
/// A stream that ends between frames is a normal close. One that ends inside
/// a prefix or body is reported as `FrameTooShort`, which the driver treats
/// as a failed handshake or a protocol violation depending on session state.
async fn read_stream<R>(connection_id: ConnectionId, mut recv: R, hub: HubHandle)
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; codec::LENGTH_PREFIX_SIZE];

    loop {
        let got = match read_full(&mut recv, &mut prefix).await {
            Ok(got) => got,
            Err(e) => {
                tracing::trace!(%connection_id, error = %e, "stream reset");
                return;
            },
        };
        if got == 0 {
            tracing::trace!(%connection_id, "stream ended");
            return;
        }
        if got < codec::LENGTH_PREFIX_SIZE {
            let error =
                ProtocolError::FrameTooShort { expected: codec::LENGTH_PREFIX_SIZE, actual: got };
            let _ = hub.connection_malformed(connection_id, error);
            return;
        }

        let len = match codec::body_len(prefix) {
            Ok(len) => len,
            Err(err) => {
                let _ = hub.connection_malformed(connection_id, err);
                return;
            },
        };

        let mut body = vec![0u8; len];
        let got = match read_full(&mut recv, &mut body).await {
            Ok(got) => got,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "stream reset mid-frame");
                return;
            },
        };
        if got < len {
            let error = ProtocolError::FrameTooShort {
                expected: codec::LENGTH_PREFIX_SIZE + len,
                actual: codec::LENGTH_PREFIX_SIZE + got,
            };
            let _ = hub.connection_malformed(connection_id, error);
            return;
        }

        let submitted = match codec::decode_body::<ClientEvent>(&body) {
            Ok(message) => hub.connection_frame(connection_id, message),
            Err(err) => hub.connection_malformed(connection_id, err),
        };
        if submitted.is_err() {
            return;
        }
    }
}

/// Fill `buf`, returning how many bytes arrived before the stream finished.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use huddle_proto::{CloseCode, Event, GroupRef, Hello, RoomId, names};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn hub() -> HubHandle {
        let auth = StaticTokenAuthenticator::new([("tok-a", "alice")]);
        let driver = ServerDriver::new(SystemEnv::new(), auth, DriverConfig::default());
        let (handle, _task) = Hub::new(driver, MemoryStorage::new(), DEFAULT_TICK_INTERVAL).spawn();
        handle
    }

    fn hello_frame() -> Vec<u8> {
        codec::encode(&ClientEvent::Hello(Hello { token: "tok-a".to_string() })).unwrap().to_vec()
    }

    fn join_frame() -> Vec<u8> {
        let join = ClientEvent::JoinGroup(GroupRef { group_id: RoomId::new("g1") });
        codec::encode(&join).unwrap().to_vec()
    }

    async fn next(rx: &mut UnboundedReceiver<Outbound>) -> Outbound {
        tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    async fn next_name(rx: &mut UnboundedReceiver<Outbound>) -> String {
        match next(rx).await {
            Outbound::Frame(frame) => codec::decode_event::<Event>(&frame).unwrap().name,
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn body_cut_short_after_auth_closes_with_protocol_error() {
        let hub = hub();
        let connection_id = ConnectionId::new(1);
        let mut rx = hub.connection_opened(connection_id).unwrap();

        let mut bytes = hello_frame();
        let join = join_frame();
        bytes.extend_from_slice(&join[..join.len() - 3]);

        read_stream(connection_id, bytes.as_slice(), hub.clone()).await;

        assert_eq!(next_name(&mut rx).await, names::GET_ONLINE_USERS);
        assert_eq!(next_name(&mut rx).await, names::CONNECTED);
        match next(&mut rx).await {
            Outbound::Close { code, .. } => assert_eq!(code, CloseCode::ProtocolError),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prefix_cut_short_before_auth_fails_handshake() {
        let hub = hub();
        let connection_id = ConnectionId::new(1);
        let mut rx = hub.connection_opened(connection_id).unwrap();

        read_stream(connection_id, &[0u8, 0][..], hub.clone()).await;

        assert_eq!(next_name(&mut rx).await, names::AUTH_ERROR);
        match next(&mut rx).await {
            Outbound::Close { code, .. } => assert_eq!(code, CloseCode::AuthFailed),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_ending_between_frames_is_not_an_error() {
        let hub = hub();
        let connection_id = ConnectionId::new(1);
        let mut rx = hub.connection_opened(connection_id).unwrap();

        let mut bytes = hello_frame();
        bytes.extend_from_slice(&join_frame());
        read_stream(connection_id, bytes.as_slice(), hub.clone()).await;

        assert_eq!(next_name(&mut rx).await, names::GET_ONLINE_USERS);
        assert_eq!(next_name(&mut rx).await, names::CONNECTED);

        // Round-trip a marker through the hub so everything before it is processed
        let marker = Event::connected(&huddle_proto::UserId::new("alice"));
        hub.emit(Target::Connection(connection_id), marker.clone()).unwrap();
        match next(&mut rx).await {
            Outbound::Frame(frame) => {
                assert_eq!(codec::decode_event::<Event>(&frame).unwrap(), marker);
            },
            other => panic!("expected marker frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_full_reports_partial_fill() {
        let mut buf = [0u8; 8];
        let got = read_full(&mut &[1u8, 2, 3][..], &mut buf).await.unwrap();
        assert_eq!(got, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}
