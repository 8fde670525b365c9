//! Synchronous hub for scenario and property tests.
//!
//! Mirrors what the production hub does with each action, minus the
//! sockets: deliveries are appended to per-connection inboxes, closes are
//! recorded and followed by the disconnect the transport would report, and
//! storage calls run inline.

use std::collections::{BTreeSet, HashMap, VecDeque};

use huddle_proto::{
    ChatRef, ClientEvent, CloseCode, ConnectionId, Event, GroupRef, Hello, ProtocolError, RoomId,
    TypingSignal, UserId, names,
};
use huddle_server::{
    DriverConfig, DriverError, LogLevel, MemoryStorage, ServerAction, ServerDriver, ServerEvent,
    StaticTokenAuthenticator, Storage, StorageError, Target,
};

use crate::SimEnv;

/// A close the driver asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRecord {
    /// Connection that was closed
    pub connection_id: ConnectionId,
    /// Application close code
    pub code: CloseCode,
    /// Reason phrase
    pub reason: String,
}

/// Simulated hub over any storage backend.
pub struct SimHub<S: Storage = MemoryStorage> {
    driver: ServerDriver<SimEnv, StaticTokenAuthenticator>,
    storage: S,
    env: SimEnv,
    next_connection_id: u64,
    open: BTreeSet<ConnectionId>,
    hold_fetches: bool,
    pending_fetches: VecDeque<(ConnectionId, UserId)>,
    inboxes: HashMap<ConnectionId, Vec<Event>>,
    closes: Vec<CloseRecord>,
    presence_broadcasts: usize,
    stamp_failures: Vec<(UserId, StorageError)>,
    logs: Vec<(LogLevel, String)>,
}

impl SimHub<MemoryStorage> {
    /// Hub with in-memory storage, default config and the given
    /// `(token, user)` pairs.
    pub fn new<'a>(tokens: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::with_storage(MemoryStorage::new(), tokens, DriverConfig::default())
    }
}

impl<S: Storage> SimHub<S> {
    /// Hub over an explicit storage backend and config.
    pub fn with_storage<'a>(
        storage: S,
        tokens: impl IntoIterator<Item = (&'a str, &'a str)>,
        config: DriverConfig,
    ) -> Self {
        let env = SimEnv::new();
        let auth = StaticTokenAuthenticator::new(tokens);

        Self {
            driver: ServerDriver::new(env.clone(), auth, config),
            storage,
            env,
            next_connection_id: 1,
            open: BTreeSet::new(),
            hold_fetches: false,
            pending_fetches: VecDeque::new(),
            inboxes: HashMap::new(),
            closes: Vec::new(),
            presence_broadcasts: 0,
            stamp_failures: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Queue group-room fetches instead of answering them inline.
    ///
    /// Lets a test close a connection while its fetch is outstanding.
    pub fn set_hold_fetches(&mut self, hold: bool) {
        self.hold_fetches = hold;
    }

    /// Open a connection. Ids are sequential from 1.
    pub fn connect(&mut self) -> Result<ConnectionId, DriverError> {
        let connection_id = ConnectionId::new(self.next_connection_id);
        self.next_connection_id += 1;

        self.open.insert(connection_id);
        self.process(ServerEvent::ConnectionAccepted { connection_id })?;
        Ok(connection_id)
    }

    /// Open a connection and authenticate it.
    ///
    /// No `hello` is sent if the driver refused the connection.
    pub fn login(&mut self, token: &str) -> Result<ConnectionId, DriverError> {
        let connection_id = self.connect()?;
        if self.open.contains(&connection_id) {
            self.hello(connection_id, token)?;
        }
        Ok(connection_id)
    }

    /// Send `hello`.
    pub fn hello(&mut self, connection_id: ConnectionId, token: &str) -> Result<(), DriverError> {
        self.send(connection_id, ClientEvent::Hello(Hello { token: token.to_string() }))
    }

    /// Send any client event.
    pub fn send(
        &mut self,
        connection_id: ConnectionId,
        message: ClientEvent,
    ) -> Result<(), DriverError> {
        self.process(ServerEvent::FrameReceived { connection_id, message })
    }

    /// Send `joinGroup`.
    pub fn join_group(
        &mut self,
        connection_id: ConnectionId,
        group: &str,
    ) -> Result<(), DriverError> {
        self.send(connection_id, ClientEvent::JoinGroup(GroupRef { group_id: RoomId::new(group) }))
    }

    /// Send `leaveGroup`.
    pub fn leave_group(
        &mut self,
        connection_id: ConnectionId,
        group: &str,
    ) -> Result<(), DriverError> {
        self.send(connection_id, ClientEvent::LeaveGroup(GroupRef { group_id: RoomId::new(group) }))
    }

    /// Send `joinChat`.
    pub fn join_chat(
        &mut self,
        connection_id: ConnectionId,
        chat: &str,
    ) -> Result<(), DriverError> {
        self.send(connection_id, ClientEvent::JoinChat(ChatRef { chat_id: RoomId::new(chat) }))
    }

    /// Send `typing`.
    pub fn typing(
        &mut self,
        connection_id: ConnectionId,
        chat: &str,
        is_group: bool,
    ) -> Result<(), DriverError> {
        let signal = TypingSignal { chat_id: RoomId::new(chat), is_group };
        self.send(connection_id, ClientEvent::Typing(signal))
    }

    /// Report an undecodable frame.
    pub fn malformed(
        &mut self,
        connection_id: ConnectionId,
        error: ProtocolError,
    ) -> Result<(), DriverError> {
        self.process(ServerEvent::MalformedFrame { connection_id, error })
    }

    /// Peer closed the connection.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Result<(), DriverError> {
        self.open.remove(&connection_id);
        self.process(ServerEvent::ConnectionClosed {
            connection_id,
            reason: "peer closed".to_string(),
        })
    }

    /// Collaborator emit.
    pub fn emit(&mut self, target: Target, event: Event) -> Result<(), DriverError> {
        self.process(ServerEvent::Emit { target, event })
    }

    /// Collaborator adds a user to a room.
    pub fn add_room_member(&mut self, user: &str, room: &str) -> Result<(), DriverError> {
        self.process(ServerEvent::AddRoomMember {
            user_id: UserId::new(user),
            room_id: RoomId::new(room),
        })
    }

    /// Collaborator removes a user from a room.
    pub fn remove_room_member(&mut self, user: &str, room: &str) -> Result<(), DriverError> {
        self.process(ServerEvent::RemoveRoomMember {
            user_id: UserId::new(user),
            room_id: RoomId::new(room),
        })
    }

    /// Advance virtual time, then tick.
    pub fn advance(&mut self, by: std::time::Duration) -> Result<(), DriverError> {
        self.env.advance(by);
        self.process(ServerEvent::Tick)
    }

    /// Answer the oldest held fetch. Returns `false` if none was pending.
    pub fn resolve_next_fetch(&mut self) -> Result<bool, DriverError> {
        let Some((connection_id, user_id)) = self.pending_fetches.pop_front() else {
            return Ok(false);
        };

        let result = self.storage.group_rooms_for(&user_id);
        self.process(ServerEvent::GroupRoomsLoaded { connection_id, user_id, result })?;
        Ok(true)
    }

    /// Feed one event to the driver and execute the resulting actions.
    pub fn process(&mut self, event: ServerEvent) -> Result<(), DriverError> {
        let actions = self.driver.process_event(event)?;
        self.execute(actions)
    }

    fn execute(&mut self, actions: Vec<ServerAction>) -> Result<(), DriverError> {
        let mut follow_ups = Vec::new();

        for action in actions {
            match action {
                ServerAction::Deliver(delivery) => {
                    if delivery.event.name == names::GET_ONLINE_USERS {
                        self.presence_broadcasts += 1;
                    }
                    for connection_id in delivery.connections {
                        self.inboxes.entry(connection_id).or_default().push(delivery.event.clone());
                    }
                },
                ServerAction::CloseConnection { connection_id, code, reason } => {
                    self.closes.push(CloseRecord { connection_id, code, reason: reason.clone() });
                    if self.open.remove(&connection_id) {
                        follow_ups.push(ServerEvent::ConnectionClosed { connection_id, reason });
                    }
                },
                ServerAction::FetchGroupRooms { connection_id, user_id } => {
                    if self.hold_fetches {
                        self.pending_fetches.push_back((connection_id, user_id));
                    } else {
                        let result = self.storage.group_rooms_for(&user_id);
                        follow_ups.push(ServerEvent::GroupRoomsLoaded {
                            connection_id,
                            user_id,
                            result,
                        });
                    }
                },
                ServerAction::StampLastSeen { user_id, at_secs } => {
                    if let Err(err) = self.storage.stamp_last_seen(&user_id, at_secs) {
                        self.stamp_failures.push((user_id, err));
                    }
                },
                ServerAction::Log { level, message } => self.logs.push((level, message)),
            }
        }

        for event in follow_ups {
            self.process(event)?;
        }
        Ok(())
    }

    /// Everything delivered to a connection so far.
    pub fn events(&self, connection_id: ConnectionId) -> &[Event] {
        self.inboxes.get(&connection_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Drain a connection's inbox.
    pub fn take_events(&mut self, connection_id: ConnectionId) -> Vec<Event> {
        self.inboxes.remove(&connection_id).unwrap_or_default()
    }

    /// Names of events delivered to a connection, in order.
    pub fn event_names(&self, connection_id: ConnectionId) -> Vec<&str> {
        self.events(connection_id).iter().map(|event| event.name.as_str()).collect()
    }

    /// Most recent presence list a connection received.
    pub fn last_online_users(&self, connection_id: ConnectionId) -> Option<Vec<UserId>> {
        self.events(connection_id)
            .iter()
            .rev()
            .find(|event| event.name == names::GET_ONLINE_USERS)
            .and_then(|event| event.payload_as().ok())
    }

    /// Connections the transport still considers open.
    pub fn open_connections(&self) -> Vec<ConnectionId> {
        self.open.iter().copied().collect()
    }

    /// Closes requested so far.
    pub fn closes(&self) -> &[CloseRecord] {
        &self.closes
    }

    /// Presence broadcasts produced so far, counting ones with no recipients.
    pub fn presence_broadcast_count(&self) -> usize {
        self.presence_broadcasts
    }

    /// Fetches held back by [`SimHub::set_hold_fetches`].
    pub fn pending_fetch_count(&self) -> usize {
        self.pending_fetches.len()
    }

    /// Last-seen writes that failed.
    pub fn stamp_failures(&self) -> &[(UserId, StorageError)] {
        &self.stamp_failures
    }

    /// Log actions, in order.
    pub fn logs(&self) -> &[(LogLevel, String)] {
        &self.logs
    }

    /// The driver under test.
    pub fn driver(&self) -> &ServerDriver<SimEnv, StaticTokenAuthenticator> {
        &self.driver
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }
}
