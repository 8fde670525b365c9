//! Event router: resolves a target into the connections that should receive
//! an event.
//!
//! Delivery is fire-and-forget. The router never queues, retries or
//! acknowledges; a target with no live connections resolves to nothing and
//! that is the correct outcome, not an error. Offline delivery belongs to the
//! durable message store.
//!
//! # Ordering
//!
//! Every connection has a single outbound stream, written in the order the
//! event loop produces deliveries. Events to one connection therefore arrive
//! in send order. There is NO ordering across connections: two peers may
//! observe two events in different relative order. Callers must not assume
//! otherwise.

use huddle_proto::{ConnectionId, Event, RoomId, UserId};

use crate::{registry::ConnectionRegistry, rooms::RoomMembership};

/// One event resolved to its recipients.
///
/// The runtime encodes `event` once and writes the same bytes to every
/// connection in `connections`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Recipients, sorted and deduplicated
    pub connections: Vec<ConnectionId>,
    /// Event to deliver
    pub event: Event,
}

/// Where an event should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Exactly one connection
    Connection(ConnectionId),
    /// Every live connection of a user
    User(UserId),
    /// Every live connection of each user
    Users(Vec<UserId>),
    /// Every member of a room, optionally minus one connection
    Room {
        /// Room to broadcast to
        room_id: RoomId,
        /// Connection to skip (usually the sender)
        exclude: Option<ConnectionId>,
    },
    /// Every authenticated connection
    Everyone,
}

/// Read-only view over the registry and room table that resolves targets.
#[derive(Debug, Clone, Copy)]
pub struct EventRouter<'a> {
    registry: &'a ConnectionRegistry,
    rooms: &'a RoomMembership,
}

impl<'a> EventRouter<'a> {
    /// Create a router over the current state.
    pub fn new(registry: &'a ConnectionRegistry, rooms: &'a RoomMembership) -> Self {
        Self { registry, rooms }
    }

    /// Deliver to one connection. `None` if it is no longer live.
    pub fn emit_to_connection(
        &self,
        connection_id: ConnectionId,
        event: Event,
    ) -> Option<Delivery> {
        if !self.registry.is_live(connection_id) {
            return None;
        }
        delivery(vec![connection_id], event)
    }

    /// Deliver to every live connection of a user. `None` if offline.
    pub fn emit_to_user(&self, user_id: &UserId, event: Event) -> Option<Delivery> {
        delivery(self.registry.iter_connections_for(user_id).collect(), event)
    }

    /// Deliver to every live connection of each user, once per connection.
    pub fn emit_to_users<'u>(
        &self,
        user_ids: impl IntoIterator<Item = &'u UserId>,
        event: Event,
    ) -> Option<Delivery> {
        let connections = user_ids
            .into_iter()
            .flat_map(|user_id| self.registry.iter_connections_for(user_id))
            .collect();
        delivery(connections, event)
    }

    /// Deliver to every member of a room except `exclude`.
    pub fn emit_to_room(
        &self,
        room_id: &RoomId,
        event: Event,
        exclude: Option<ConnectionId>,
    ) -> Option<Delivery> {
        let connections =
            self.rooms.iter_members(room_id).filter(|conn| Some(*conn) != exclude).collect();
        delivery(connections, event)
    }

    /// Deliver to every authenticated connection.
    ///
    /// Unlike the targeted primitives this always returns a delivery, possibly
    /// with no recipients, so presence publication stays one-to-one with
    /// registry mutations.
    pub fn broadcast(&self, event: Event) -> Delivery {
        let mut connections: Vec<_> = self.registry.all_connections().collect();
        connections.sort_unstable();
        Delivery { connections, event }
    }

    /// Resolve any [`Target`].
    pub fn emit(&self, target: &Target, event: Event) -> Option<Delivery> {
        match target {
            Target::Connection(connection_id) => self.emit_to_connection(*connection_id, event),
            Target::User(user_id) => self.emit_to_user(user_id, event),
            Target::Users(user_ids) => self.emit_to_users(user_ids, event),
            Target::Room { room_id, exclude } => self.emit_to_room(room_id, event, *exclude),
            Target::Everyone => Some(self.broadcast(event)).filter(|d| !d.connections.is_empty()),
        }
    }
}

fn delivery(mut connections: Vec<ConnectionId>, event: Event) -> Option<Delivery> {
    if connections.is_empty() {
        return None;
    }
    connections.sort_unstable();
    connections.dedup();
    Some(Delivery { connections, event })
}

#[cfg(test)]
mod tests {
    use super::*;

    const C1: ConnectionId = ConnectionId::new(1);
    const C2: ConnectionId = ConnectionId::new(2);
    const C3: ConnectionId = ConnectionId::new(3);

    fn setup() -> (ConnectionRegistry, RoomMembership) {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomMembership::new();

        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        registry.register(&alice, C1);
        registry.register(&alice, C2);
        registry.register(&bob, C3);

        let group = RoomId::new("g1");
        rooms.join(C1, &group);
        rooms.join(C2, &group);
        rooms.join(C3, &group);

        (registry, rooms)
    }

    fn ping() -> Event {
        Event::auth_error("ping")
    }

    #[test]
    fn emit_to_user_reaches_every_connection() {
        let (registry, rooms) = setup();
        let router = EventRouter::new(&registry, &rooms);

        let delivery = router.emit_to_user(&UserId::new("alice"), ping()).unwrap();
        assert_eq!(delivery.connections, vec![C1, C2]);
    }

    #[test]
    fn emit_to_offline_user_is_silent() {
        let (registry, rooms) = setup();
        let router = EventRouter::new(&registry, &rooms);

        assert!(router.emit_to_user(&UserId::new("nobody"), ping()).is_none());
    }

    #[test]
    fn emit_to_dead_connection_is_silent() {
        let (registry, rooms) = setup();
        let router = EventRouter::new(&registry, &rooms);

        assert!(router.emit_to_connection(ConnectionId::new(99), ping()).is_none());
        assert_eq!(router.emit_to_connection(C3, ping()).unwrap().connections, vec![C3]);
    }

    #[test]
    fn room_broadcast_excludes_sender_only() {
        let (registry, rooms) = setup();
        let router = EventRouter::new(&registry, &rooms);

        let delivery = router.emit_to_room(&RoomId::new("g1"), ping(), Some(C1)).unwrap();
        assert_eq!(delivery.connections, vec![C2, C3]);
    }

    #[test]
    fn room_with_only_excluded_member_is_silent() {
        let mut registry = ConnectionRegistry::new();
        let mut rooms = RoomMembership::new();
        registry.register(&UserId::new("alice"), C1);
        rooms.join(C1, &RoomId::new("solo"));

        let router = EventRouter::new(&registry, &rooms);
        assert!(router.emit_to_room(&RoomId::new("solo"), ping(), Some(C1)).is_none());
    }

    #[test]
    fn emit_to_users_deduplicates() {
        let (registry, rooms) = setup();
        let router = EventRouter::new(&registry, &rooms);

        let users = [UserId::new("alice"), UserId::new("bob"), UserId::new("alice")];
        let delivery = router.emit_to_users(&users, ping()).unwrap();
        assert_eq!(delivery.connections, vec![C1, C2, C3]);
    }

    #[test]
    fn broadcast_reaches_all_registered() {
        let (registry, rooms) = setup();
        let router = EventRouter::new(&registry, &rooms);

        assert_eq!(router.broadcast(ping()).connections, vec![C1, C2, C3]);
    }

    #[test]
    fn broadcast_to_empty_registry_still_returns_delivery() {
        let registry = ConnectionRegistry::new();
        let rooms = RoomMembership::new();
        let router = EventRouter::new(&registry, &rooms);

        assert!(router.broadcast(ping()).connections.is_empty());
        assert!(router.emit(&Target::Everyone, ping()).is_none());
    }
}
