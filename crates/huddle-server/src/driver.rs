//! Server driver.
//!
//! Ties together the per-connection session state machines, the presence
//! publisher (which owns the connection registry), room membership and the
//! event router. Sans-IO: events in, actions out. The runtime owns sockets,
//! storage and timers and feeds their results back in as events.

use std::collections::HashMap;

use huddle_core::{Environment, Session, SessionConfig, SessionError, SessionState};
use huddle_proto::{ClientEvent, CloseCode, ConnectionId, Event, ProtocolError, RoomId, UserId};

use crate::{
    auth::{AuthError, Authenticator},
    presence::PresencePublisher,
    registry::ConnectionRegistry,
    rooms::{LeaveOutcome, RoomMembership},
    router::{Delivery, EventRouter, Target},
    server_error::DriverError,
    storage::StorageError,
};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Session configuration (handshake timeout)
    pub session: SessionConfig,
    /// Maximum concurrent connections, authenticated or not
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { session: SessionConfig::default(), max_connections: 10_000 }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        connection_id: ConnectionId,
    },

    /// A client event was decoded from a connection
    FrameReceived {
        /// Connection that sent the frame
        connection_id: ConnectionId,
        /// Decoded event
        message: ClientEvent,
    },

    /// A frame arrived that could not be decoded
    MalformedFrame {
        /// Connection that sent the frame
        connection_id: ConnectionId,
        /// Why decoding failed
        error: ProtocolError,
    },

    /// Result of a [`ServerAction::FetchGroupRooms`] request
    GroupRoomsLoaded {
        /// Connection the fetch was issued for
        connection_id: ConnectionId,
        /// User the fetch was issued for
        user_id: UserId,
        /// Group rooms, or why they could not be loaded
        result: Result<Vec<RoomId>, StorageError>,
    },

    /// A connection was closed (by peer, error or a prior close action)
    ConnectionClosed {
        /// Connection that was closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Collaborator asks for an event to be delivered
    Emit {
        /// Recipients
        target: Target,
        /// Event to deliver
        event: Event,
    },

    /// Collaborator joins every live connection of a user to a room
    AddRoomMember {
        /// User whose connections join
        user_id: UserId,
        /// Room to join
        room_id: RoomId,
    },

    /// Collaborator removes every live connection of a user from a room
    RemoveRoomMember {
        /// User whose connections leave
        user_id: UserId,
        /// Room to leave
        room_id: RoomId,
    },

    /// Periodic tick for timeout checking
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Write one event to each listed connection
    Deliver(Delivery),

    /// Close a connection after its pending deliveries are written
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Application close code
        code: CloseCode,
        /// Reason for closure
        reason: String,
    },

    /// Load the user's group rooms and answer with
    /// [`ServerEvent::GroupRoomsLoaded`]
    FetchGroupRooms {
        /// Connection being bootstrapped
        connection_id: ConnectionId,
        /// User to load rooms for
        user_id: UserId,
    },

    /// Best-effort last-seen write. Failure is logged by the runtime.
    StampLastSeen {
        /// User that went offline
        user_id: UserId,
        /// Unix seconds
        at_secs: u64,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Single owner of all connection, presence and room state. The runtime runs
/// it on one task, so none of that state needs a lock.
pub struct ServerDriver<E, A>
where
    E: Environment,
    A: Authenticator,
{
    /// Session state machines (connection_id → Session)
    pub(crate) sessions: HashMap<ConnectionId, Session<E::Instant>>,
    /// Registry, mutated only through the publisher
    pub(crate) presence: PresencePublisher,
    /// Room membership
    pub(crate) rooms: RoomMembership,
    /// Credential verifier
    pub(crate) authenticator: A,
    /// Environment (time, RNG)
    pub(crate) env: E,
    config: DriverConfig,
}

impl<E, A> ServerDriver<E, A>
where
    E: Environment,
    A: Authenticator,
{
    /// Create a new server driver.
    pub fn new(env: E, authenticator: A, config: DriverConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            presence: PresencePublisher::new(),
            rooms: RoomMembership::new(),
            authenticator,
            env,
            config,
        }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            ServerEvent::FrameReceived { connection_id, message } => {
                self.handle_frame_received(connection_id, message)
            },
            ServerEvent::MalformedFrame { connection_id, error } => {
                self.handle_malformed_frame(connection_id, &error)
            },
            ServerEvent::GroupRoomsLoaded { connection_id, user_id, result } => {
                Ok(self.handle_group_rooms_loaded(connection_id, &user_id, result))
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                Ok(self.handle_disconnect(connection_id, &reason))
            },
            ServerEvent::Emit { target, event } => Ok(self.handle_emit(&target, event)),
            ServerEvent::AddRoomMember { user_id, room_id } => {
                Ok(self.handle_add_room_member(&user_id, &room_id))
            },
            ServerEvent::RemoveRoomMember { user_id, room_id } => {
                Ok(self.handle_remove_room_member(&user_id, &room_id))
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Vec<ServerAction>, DriverError> {
        if self.sessions.contains_key(&connection_id) {
            return Err(DriverError::ConnectionAlreadyExists(connection_id));
        }

        if self.sessions.len() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseConnection {
                    connection_id,
                    code: CloseCode::ServerFull,
                    reason: "max connections exceeded".to_string(),
                },
                log(LogLevel::Warn, format!("connection {connection_id} refused: server full")),
            ]);
        }

        let session = Session::new(connection_id, self.env.now(), self.config.session.clone());
        self.sessions.insert(connection_id, session);

        Ok(vec![log(LogLevel::Debug, format!("connection {connection_id} accepted"))])
    }

    /// Handle a decoded client event.
    fn handle_frame_received(
        &mut self,
        connection_id: ConnectionId,
        message: ClientEvent,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let state = self
            .sessions
            .get(&connection_id)
            .map(Session::state)
            .ok_or(DriverError::ConnectionNotFound(connection_id))?;

        match (state, message) {
            (SessionState::Connecting, ClientEvent::Hello(hello)) => {
                self.handle_hello(connection_id, &hello.token)
            },
            (SessionState::Connecting, other) => Ok(self.reject_handshake(
                connection_id,
                &AuthError::UnexpectedFrame(other.name().to_string()),
            )),
            (SessionState::Authenticated, ClientEvent::Hello(_)) => Ok(vec![log(
                LogLevel::Warn,
                format!("connection {connection_id} sent hello twice, ignored"),
            )]),
            (SessionState::Authenticated, message) => {
                self.handle_client_event(connection_id, message)
            },
            (SessionState::Closed, message) => Ok(vec![log(
                LogLevel::Debug,
                format!("dropping {} from closed connection {connection_id}", message.name()),
            )]),
        }
    }

    /// Handle a frame that failed to decode.
    ///
    /// Before authentication it counts as a failed handshake. Afterwards a
    /// body that does not decode (for instance an event this server does not
    /// know) is dropped, while a broken length prefix desynchronizes the
    /// stream and closes the connection.
    fn handle_malformed_frame(
        &mut self,
        connection_id: ConnectionId,
        error: &ProtocolError,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let state = self
            .sessions
            .get(&connection_id)
            .map(Session::state)
            .ok_or(DriverError::ConnectionNotFound(connection_id))?;

        match state {
            SessionState::Connecting => Ok(self.reject_handshake(
                connection_id,
                &AuthError::UnexpectedFrame(format!("malformed frame ({error})")),
            )),
            SessionState::Authenticated => match error {
                ProtocolError::Decode(_) | ProtocolError::Encode(_) => Ok(vec![log(
                    LogLevel::Warn,
                    format!("connection {connection_id} sent undecodable event: {error}"),
                )]),
                ProtocolError::FrameTooShort { .. }
                | ProtocolError::FrameTooLarge { .. }
                | ProtocolError::LengthMismatch { .. } => Ok(vec![
                    ServerAction::CloseConnection {
                        connection_id,
                        code: CloseCode::ProtocolError,
                        reason: error.to_string(),
                    },
                    log(
                        LogLevel::Warn,
                        format!("connection {connection_id} framing error: {error}"),
                    ),
                ]),
            },
            SessionState::Closed => Ok(Vec::new()),
        }
    }

    /// Handle an event from an authenticated connection.
    fn handle_client_event(
        &mut self,
        connection_id: ConnectionId,
        message: ClientEvent,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let user_id = self.session_user(connection_id, message.name())?;

        let actions = match message {
            ClientEvent::Hello(_) => Vec::new(),
            ClientEvent::JoinGroup(group) => {
                self.join_room(connection_id, &group.group_id);
                Vec::new()
            },
            ClientEvent::JoinChat(chat) => {
                self.join_room(connection_id, &chat.chat_id);
                Vec::new()
            },
            ClientEvent::LeaveGroup(group) => self.leave_room(connection_id, &group.group_id),
            ClientEvent::LeaveChat(chat) => self.leave_room(connection_id, &chat.chat_id),
            ClientEvent::Typing(signal) => self.relay_to_room(
                &signal.chat_id,
                Event::user_typing(&signal.chat_id, &user_id, signal.is_group),
                connection_id,
            ),
            ClientEvent::StopTyping(signal) => self.relay_to_room(
                &signal.chat_id,
                Event::user_stop_typing(&signal.chat_id, &user_id, signal.is_group),
                connection_id,
            ),
            ClientEvent::MarkGroupRead(read) => {
                let mut actions = Vec::new();
                if read.user_id != user_id {
                    actions.push(log(
                        LogLevel::Warn,
                        format!(
                            "connection {connection_id} claimed read receipt for {}, \
                             relaying as {user_id}",
                            read.user_id
                        ),
                    ));
                }
                actions.extend(self.relay_to_room(
                    &read.group_id,
                    Event::group_messages_read(&read.group_id, &user_id),
                    connection_id,
                ));
                actions
            },
        };

        Ok(actions)
    }

    /// Authenticated user of a connection, cloned out of the session.
    fn session_user(
        &self,
        connection_id: ConnectionId,
        operation: &str,
    ) -> Result<UserId, DriverError> {
        let session = self
            .sessions
            .get(&connection_id)
            .ok_or(DriverError::ConnectionNotFound(connection_id))?;

        session
            .authenticated_user(operation)
            .cloned()
            .map_err(|source| DriverError::Session { connection_id, source })
    }

    fn join_room(&mut self, connection_id: ConnectionId, room_id: &RoomId) {
        self.rooms.join(connection_id, room_id);
    }

    fn leave_room(&mut self, connection_id: ConnectionId, room_id: &RoomId) -> Vec<ServerAction> {
        match self.rooms.leave(connection_id, room_id) {
            LeaveOutcome::Left | LeaveOutcome::NotMember => Vec::new(),
            LeaveOutcome::Protected => vec![log(
                LogLevel::Debug,
                format!("connection {connection_id} may not leave its personal room"),
            )],
        }
    }

    fn relay_to_room(
        &self,
        room_id: &RoomId,
        event: Event,
        sender: ConnectionId,
    ) -> Vec<ServerAction> {
        self.router()
            .emit_to_room(room_id, event, Some(sender))
            .map(ServerAction::Deliver)
            .into_iter()
            .collect()
    }

    /// Handle a collaborator emit. Unresolvable targets are a silent no-op.
    fn handle_emit(&self, target: &Target, event: Event) -> Vec<ServerAction> {
        self.router().emit(target, event).map(ServerAction::Deliver).into_iter().collect()
    }

    /// Join every live connection of a user to a room.
    fn handle_add_room_member(&mut self, user_id: &UserId, room_id: &RoomId) -> Vec<ServerAction> {
        let connections: Vec<_> = self.presence.registry().iter_connections_for(user_id).collect();
        for connection_id in &connections {
            self.rooms.join(*connection_id, room_id);
        }

        vec![log(
            LogLevel::Debug,
            format!("added {user_id} to room {room_id} on {} connection(s)", connections.len()),
        )]
    }

    /// Remove every live connection of a user from a room.
    ///
    /// Personal rooms stay protected even against the collaborator.
    fn handle_remove_room_member(
        &mut self,
        user_id: &UserId,
        room_id: &RoomId,
    ) -> Vec<ServerAction> {
        let connections: Vec<_> = self.presence.registry().iter_connections_for(user_id).collect();
        let mut left = 0usize;
        for connection_id in connections {
            if self.rooms.leave(connection_id, room_id) == LeaveOutcome::Left {
                left += 1;
            }
        }

        vec![log(
            LogLevel::Debug,
            format!("removed {user_id} from room {room_id} on {left} connection(s)"),
        )]
    }

    /// Handle periodic tick: close connections whose handshake window passed.
    fn handle_tick(&mut self) -> Vec<ServerAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let mut expired: Vec<_> = self
            .sessions
            .iter()
            .filter_map(|(id, session)| session.check_handshake_timeout(now).map(|e| (*id, e)))
            .collect();
        expired.sort_unstable_by_key(|(id, _)| *id);

        for (connection_id, elapsed) in expired {
            if let Some(session) = self.sessions.get_mut(&connection_id) {
                session.close();
            }

            let reason = SessionError::HandshakeTimeout { elapsed }.to_string();
            actions.push(log(LogLevel::Info, format!("connection {connection_id}: {reason}")));
            actions.push(ServerAction::CloseConnection {
                connection_id,
                code: CloseCode::HandshakeTimeout,
                reason,
            });
        }

        actions
    }

    pub(crate) fn router(&self) -> EventRouter<'_> {
        EventRouter::new(self.presence.registry(), &self.rooms)
    }

    /// Connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        self.presence.registry()
    }

    /// Room membership (read-only).
    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    /// State of a connection's session. `None` once the connection is gone.
    pub fn session_state(&self, connection_id: ConnectionId) -> Option<SessionState> {
        self.sessions.get(&connection_id).map(Session::state)
    }

    /// Number of tracked connections, authenticated or not.
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Current presence list as an event.
    pub fn presence_snapshot(&self) -> Event {
        self.presence.snapshot_event()
    }
}

impl<E, A> std::fmt::Debug for ServerDriver<E, A>
where
    E: Environment,
    A: Authenticator,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.sessions.len())
            .field("online_users", &self.presence.registry().online_user_count())
            .field("rooms", &self.rooms.room_count())
            .finish()
    }
}

pub(crate) fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use huddle_proto::{GroupRef, Hello, TypingSignal, names};

    use super::*;
    use crate::auth::StaticTokenAuthenticator;

    #[derive(Clone)]
    struct TestEnv {
        start: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { start: Instant::now(), offset: Arc::new(Mutex::new(Duration::ZERO)) }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            self.start + *self.offset.lock().unwrap()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }

        fn wall_clock_secs(&self) -> u64 {
            1_700_000_000
        }
    }

    type TestDriver = ServerDriver<TestEnv, StaticTokenAuthenticator>;

    const C1: ConnectionId = ConnectionId::new(1);
    const C2: ConnectionId = ConnectionId::new(2);

    fn driver_with(config: DriverConfig) -> (TestDriver, TestEnv) {
        let env = TestEnv::new();
        let auth = StaticTokenAuthenticator::new([("tok-alice", "alice"), ("tok-bob", "bob")]);
        (ServerDriver::new(env.clone(), auth, config), env)
    }

    fn driver() -> TestDriver {
        driver_with(DriverConfig::default()).0
    }

    fn accept(driver: &mut TestDriver, connection_id: ConnectionId) {
        driver.process_event(ServerEvent::ConnectionAccepted { connection_id }).unwrap();
    }

    fn frame(
        driver: &mut TestDriver,
        connection_id: ConnectionId,
        message: ClientEvent,
    ) -> Vec<ServerAction> {
        driver.process_event(ServerEvent::FrameReceived { connection_id, message }).unwrap()
    }

    fn hello(token: &str) -> ClientEvent {
        ClientEvent::Hello(Hello { token: token.to_string() })
    }

    fn deliveries(actions: &[ServerAction]) -> Vec<&Delivery> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::Deliver(delivery) => Some(delivery),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn accepts_connection_in_connecting_state() {
        let mut driver = driver();
        let actions =
            driver.process_event(ServerEvent::ConnectionAccepted { connection_id: C1 }).unwrap();

        assert_eq!(driver.connection_count(), 1);
        assert_eq!(driver.session_state(C1), Some(SessionState::Connecting));
        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn refuses_when_max_connections_reached() {
        let (mut driver, _) =
            driver_with(DriverConfig { max_connections: 1, ..Default::default() });
        accept(&mut driver, C1);

        let actions =
            driver.process_event(ServerEvent::ConnectionAccepted { connection_id: C2 }).unwrap();

        assert_eq!(driver.connection_count(), 1);
        assert!(matches!(
            actions[0],
            ServerAction::CloseConnection { connection_id: C2, code: CloseCode::ServerFull, .. }
        ));
    }

    #[test]
    fn duplicate_accept_is_an_error() {
        let mut driver = driver();
        accept(&mut driver, C1);

        let result = driver.process_event(ServerEvent::ConnectionAccepted { connection_id: C1 });
        assert!(matches!(result, Err(DriverError::ConnectionAlreadyExists(C1))));
    }

    #[test]
    fn frame_from_unknown_connection_is_an_error() {
        let mut driver = driver();
        let result = driver.process_event(ServerEvent::FrameReceived {
            connection_id: C1,
            message: hello("x"),
        });
        assert!(matches!(result, Err(DriverError::ConnectionNotFound(C1))));
    }

    #[test]
    fn hello_bootstraps_in_order() {
        let mut driver = driver();
        accept(&mut driver, C1);

        let actions = frame(&mut driver, C1, hello("tok-alice"));

        let ServerAction::Deliver(presence) = &actions[0] else { panic!("expected presence") };
        assert_eq!(presence.event.name, names::GET_ONLINE_USERS);
        assert_eq!(presence.connections, vec![C1]);

        let ServerAction::Deliver(ack) = &actions[1] else { panic!("expected connected") };
        assert_eq!(ack.event.name, names::CONNECTED);
        assert_eq!(ack.connections, vec![C1]);

        assert!(matches!(
            &actions[2],
            ServerAction::FetchGroupRooms { connection_id: C1, user_id }
                if user_id.as_str() == "alice"
        ));

        assert_eq!(driver.session_state(C1), Some(SessionState::Authenticated));
        assert!(driver.rooms().is_member(C1, &UserId::new("alice").personal_room()));
    }

    #[test]
    fn bad_token_closes_without_registering() {
        let mut driver = driver();
        accept(&mut driver, C1);

        let actions = frame(&mut driver, C1, hello("forged"));

        let sent = deliveries(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event.name, names::AUTH_ERROR);
        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::CloseConnection { code: CloseCode::AuthFailed, .. }
        )));
        assert_eq!(driver.session_state(C1), Some(SessionState::Closed));
        assert_eq!(driver.registry().connection_count(), 0);
    }

    #[test]
    fn non_hello_first_frame_is_auth_failure() {
        let mut driver = driver();
        accept(&mut driver, C1);

        let join = ClientEvent::JoinGroup(GroupRef { group_id: RoomId::new("g1") });
        let actions = frame(&mut driver, C1, join);

        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::CloseConnection { code: CloseCode::AuthFailed, .. }
        )));
        assert!(!driver.rooms().is_member(C1, &RoomId::new("g1")));
    }

    #[test]
    fn typing_reaches_room_except_sender() {
        let mut driver = driver();
        accept(&mut driver, C1);
        accept(&mut driver, C2);
        frame(&mut driver, C1, hello("tok-alice"));
        frame(&mut driver, C2, hello("tok-bob"));

        let g1 = RoomId::new("g1");
        frame(&mut driver, C1, ClientEvent::JoinGroup(GroupRef { group_id: g1.clone() }));
        frame(&mut driver, C2, ClientEvent::JoinGroup(GroupRef { group_id: g1.clone() }));

        let actions = frame(
            &mut driver,
            C1,
            ClientEvent::Typing(TypingSignal { chat_id: g1, is_group: true }),
        );

        let sent = deliveries(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].connections, vec![C2]);
        assert_eq!(sent[0].event.name, names::USER_TYPING);
    }

    #[test]
    fn duplicate_hello_is_ignored() {
        let mut driver = driver();
        accept(&mut driver, C1);
        frame(&mut driver, C1, hello("tok-alice"));

        let actions = frame(&mut driver, C1, hello("tok-bob"));

        assert!(deliveries(&actions).is_empty());
        assert_eq!(driver.registry().user_for(C1), Some(&UserId::new("alice")));
    }

    #[test]
    fn undecodable_event_after_auth_is_dropped() {
        let mut driver = driver();
        accept(&mut driver, C1);
        frame(&mut driver, C1, hello("tok-alice"));

        let actions = driver
            .process_event(ServerEvent::MalformedFrame {
                connection_id: C1,
                error: ProtocolError::Decode("unknown variant".to_string()),
            })
            .unwrap();

        assert!(!actions.iter().any(|a| matches!(a, ServerAction::CloseConnection { .. })));
        assert_eq!(driver.session_state(C1), Some(SessionState::Authenticated));
    }

    #[test]
    fn oversized_frame_after_auth_closes() {
        let mut driver = driver();
        accept(&mut driver, C1);
        frame(&mut driver, C1, hello("tok-alice"));

        let actions = driver
            .process_event(ServerEvent::MalformedFrame {
                connection_id: C1,
                error: ProtocolError::FrameTooLarge { size: 1 << 20, max: 1 << 16 },
            })
            .unwrap();

        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::CloseConnection { code: CloseCode::ProtocolError, .. }
        )));
    }

    #[test]
    fn handshake_timeout_closes_once() {
        let (mut driver, env) = driver_with(DriverConfig::default());
        accept(&mut driver, C1);
        accept(&mut driver, C2);
        frame(&mut driver, C2, hello("tok-bob"));

        env.advance(Duration::from_secs(31));
        let actions = driver.process_event(ServerEvent::Tick).unwrap();

        let closes: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                ServerAction::CloseConnection { connection_id, code, .. } => {
                    Some((*connection_id, *code))
                },
                _ => None,
            })
            .collect();
        assert_eq!(closes, vec![(C1, CloseCode::HandshakeTimeout)]);

        let again = driver.process_event(ServerEvent::Tick).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn remove_room_member_keeps_personal_room() {
        let mut driver = driver();
        accept(&mut driver, C1);
        frame(&mut driver, C1, hello("tok-alice"));

        let alice = UserId::new("alice");
        driver
            .process_event(ServerEvent::RemoveRoomMember {
                user_id: alice.clone(),
                room_id: alice.personal_room(),
            })
            .unwrap();

        assert!(driver.rooms().is_member(C1, &alice.personal_room()));
    }
}
