//! Room membership: which connections receive which room broadcasts.
//!
//! Membership is per connection, not per user. A user with two connections
//! must have both joined to be fully reachable in a room.
//!
//! Personal rooms (room id == user id) are tied to connection lifetime. A
//! connection joins its personal room through [`RoomMembership::join_personal`]
//! at authentication and only leaves it through
//! [`RoomMembership::drop_connection`] at disconnect; an explicit leave that
//! targets it is ignored.
//!
//! Like the registry, both directions are indexed and empty rooms are removed
//! rather than left behind.

use std::collections::{HashMap, HashSet};

use huddle_proto::{ConnectionId, RoomId, UserId};

/// Result of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Connection was a member and has left
    Left,
    /// Connection was not a member
    NotMember,
    /// Target was the connection's own personal room; ignored
    Protected,
}

/// Room membership table.
#[derive(Debug, Default)]
pub struct RoomMembership {
    /// Room ID → member connections. Never holds an empty set.
    members: HashMap<RoomId, HashSet<ConnectionId>>,
    /// Connection ID → joined rooms
    joined: HashMap<ConnectionId, HashSet<RoomId>>,
    /// Connection ID → its personal room
    personal: HashMap<ConnectionId, RoomId>,
}

impl RoomMembership {
    /// Create an empty membership table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a connection to a room.
    ///
    /// Idempotent. Returns `true` if the connection was not already a member.
    pub fn join(&mut self, connection_id: ConnectionId, room_id: &RoomId) -> bool {
        let added = self.members.entry(room_id.clone()).or_default().insert(connection_id);
        self.joined.entry(connection_id).or_default().insert(room_id.clone());
        added
    }

    /// Join a connection to its user's personal room and pin it there.
    pub fn join_personal(&mut self, connection_id: ConnectionId, user_id: &UserId) -> bool {
        let room_id = user_id.personal_room();
        let added = self.join(connection_id, &room_id);
        self.personal.insert(connection_id, room_id);
        added
    }

    /// Remove a connection from a room.
    ///
    /// Idempotent. Ignored if the room is the connection's personal room.
    pub fn leave(&mut self, connection_id: ConnectionId, room_id: &RoomId) -> LeaveOutcome {
        if self.personal.get(&connection_id) == Some(room_id) {
            return LeaveOutcome::Protected;
        }

        if self.remove_membership(connection_id, room_id) {
            LeaveOutcome::Left
        } else {
            LeaveOutcome::NotMember
        }
    }

    /// Remove every membership of a connection, personal room included.
    ///
    /// Returns the rooms the connection was in. Called when the connection
    /// closes.
    pub fn drop_connection(&mut self, connection_id: ConnectionId) -> HashSet<RoomId> {
        self.personal.remove(&connection_id);
        let rooms = self.joined.remove(&connection_id).unwrap_or_default();

        for room_id in &rooms {
            if let Some(set) = self.members.get_mut(room_id) {
                set.remove(&connection_id);
                if set.is_empty() {
                    self.members.remove(room_id);
                }
            }
        }

        rooms
    }

    /// Live connections joined to a room.
    pub fn members_of(&self, room_id: &RoomId) -> HashSet<ConnectionId> {
        self.members.get(room_id).cloned().unwrap_or_default()
    }

    /// Iterate a room's members without cloning the set.
    pub fn iter_members(&self, room_id: &RoomId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.get(room_id).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Rooms a connection is joined to.
    pub fn rooms_of(&self, connection_id: ConnectionId) -> impl Iterator<Item = &RoomId> + '_ {
        self.joined.get(&connection_id).into_iter().flat_map(|set| set.iter())
    }

    /// Whether a connection is joined to a room.
    pub fn is_member(&self, connection_id: ConnectionId, room_id: &RoomId) -> bool {
        self.members.get(room_id).is_some_and(|set| set.contains(&connection_id))
    }

    /// Connections with at least one membership.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.joined.keys().copied()
    }

    /// Personal room a connection is pinned to, if any.
    pub fn personal_room_of(&self, connection_id: ConnectionId) -> Option<&RoomId> {
        self.personal.get(&connection_id)
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    fn remove_membership(&mut self, connection_id: ConnectionId, room_id: &RoomId) -> bool {
        let removed = self.members.get_mut(room_id).is_some_and(|set| set.remove(&connection_id));

        if self.members.get(room_id).is_some_and(HashSet::is_empty) {
            self.members.remove(room_id);
        }

        if let Some(rooms) = self.joined.get_mut(&connection_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.joined.remove(&connection_id);
            }
        }

        removed
    }
}
