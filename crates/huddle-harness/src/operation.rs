//! Operations for randomized testing.
//!
//! Indices are small integers that get mapped onto a fixed population of
//! users, rooms and currently open connections, so random byte strings
//! almost always decode into something meaningful.

use std::time::Duration;

use arbitrary::Arbitrary;
use ciborium::Value;
use huddle_proto::{
    ClientEvent, ConnectionId, Event, GroupRead, ProtocolError, RoomId, UserId, names,
};
use huddle_server::{DriverConfig, DriverError, Storage, Target};

use crate::SimHub;

/// Number of distinct users operations draw from.
pub const USER_COUNT: u8 = 4;

/// Number of distinct group rooms operations draw from.
const ROOM_COUNT: u8 = 3;

/// Token for user index `i`.
pub fn token_for(i: u8) -> String {
    format!("tok-u{}", i % USER_COUNT)
}

/// User id for user index `i`.
pub fn user_for(i: u8) -> String {
    format!("u{}", i % USER_COUNT)
}

fn room_for(i: u8) -> String {
    format!("g{}", i % ROOM_COUNT)
}

/// One step applied to a [`SimHub`].
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Open a connection and authenticate as a user
    Connect {
        /// User index
        user: u8,
    },
    /// Open a connection and present a bad token
    BadHello,
    /// Open a connection and never authenticate
    Lurk,
    /// Peer closes an open connection
    Disconnect {
        /// Index into open connections
        slot: u8,
    },
    /// Connection joins a group room
    JoinGroup {
        /// Index into open connections
        slot: u8,
        /// Room index
        room: u8,
    },
    /// Connection leaves a group room
    LeaveGroup {
        /// Index into open connections
        slot: u8,
        /// Room index
        room: u8,
    },
    /// Connection tries to leave its own personal room
    LeavePersonal {
        /// Index into open connections
        slot: u8,
    },
    /// Connection signals typing in a group room
    Typing {
        /// Index into open connections
        slot: u8,
        /// Room index
        room: u8,
    },
    /// Connection marks a group read
    MarkRead {
        /// Index into open connections
        slot: u8,
        /// Room index
        room: u8,
    },
    /// Connection sends a frame that fails to decode
    Garbage {
        /// Index into open connections
        slot: u8,
    },
    /// Collaborator adds a user to a room
    AddMember {
        /// User index
        user: u8,
        /// Room index
        room: u8,
    },
    /// Collaborator removes a user from a room
    RemoveMember {
        /// User index
        user: u8,
        /// Room index
        room: u8,
    },
    /// Collaborator emits to a user
    EmitToUser {
        /// User index
        user: u8,
    },
    /// Answer the oldest outstanding group-room fetch
    ResolveFetch,
    /// Advance virtual time and tick
    Advance {
        /// Seconds to advance
        secs: u8,
    },
}

impl<S: Storage> SimHub<S> {
    /// Hub whose token table covers every user index.
    pub fn for_operations(storage: S, config: DriverConfig) -> Self {
        let tokens: Vec<_> = (0..USER_COUNT).map(|i| (token_for(i), user_for(i))).collect();
        Self::with_storage(
            storage,
            tokens.iter().map(|(token, user)| (token.as_str(), user.as_str())),
            config,
        )
    }

    /// Apply one operation. Operations naming a slot are skipped when no
    /// connection is open.
    pub fn apply(&mut self, op: &Operation) -> Result<(), DriverError> {
        match *op {
            Operation::Connect { user } => self.login(&token_for(user)).map(|_| ()),
            Operation::BadHello => self.login("forged").map(|_| ()),
            Operation::Lurk => self.connect().map(|_| ()),
            Operation::Disconnect { slot } => match self.slot(slot) {
                Some(conn) => self.disconnect(conn),
                None => Ok(()),
            },
            Operation::JoinGroup { slot, room } => match self.slot(slot) {
                Some(conn) => self.join_group(conn, &room_for(room)),
                None => Ok(()),
            },
            Operation::LeaveGroup { slot, room } => match self.slot(slot) {
                Some(conn) => self.leave_group(conn, &room_for(room)),
                None => Ok(()),
            },
            Operation::LeavePersonal { slot } => match self.slot(slot) {
                Some(conn) => match self.driver().registry().user_for(conn).cloned() {
                    Some(user) => self.leave_group(conn, user.as_str()),
                    None => Ok(()),
                },
                None => Ok(()),
            },
            Operation::Typing { slot, room } => match self.slot(slot) {
                Some(conn) => self.typing(conn, &room_for(room), true),
                None => Ok(()),
            },
            Operation::MarkRead { slot, room } => match self.slot(slot) {
                Some(conn) => {
                    let user_id = self
                        .driver()
                        .registry()
                        .user_for(conn)
                        .cloned()
                        .unwrap_or_else(|| UserId::new("nobody"));
                    let read = GroupRead { group_id: RoomId::new(room_for(room)), user_id };
                    self.send(conn, ClientEvent::MarkGroupRead(read))
                },
                None => Ok(()),
            },
            Operation::Garbage { slot } => match self.slot(slot) {
                Some(conn) => self.malformed(conn, ProtocolError::Decode("garbage".to_string())),
                None => Ok(()),
            },
            Operation::AddMember { user, room } => {
                self.add_room_member(&user_for(user), &room_for(room))
            },
            Operation::RemoveMember { user, room } => {
                self.remove_room_member(&user_for(user), &room_for(room))
            },
            Operation::EmitToUser { user } => self.emit(
                Target::User(UserId::new(user_for(user))),
                Event::new(names::NEW_MESSAGE, Value::Text("ping".to_string())),
            ),
            Operation::ResolveFetch => self.resolve_next_fetch().map(|_| ()),
            Operation::Advance { secs } => self.advance(Duration::from_secs(u64::from(secs))),
        }
    }

    fn slot(&self, slot: u8) -> Option<ConnectionId> {
        let open = self.open_connections();
        if open.is_empty() {
            return None;
        }
        open.get(usize::from(slot) % open.len()).copied()
    }
}
