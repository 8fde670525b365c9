//! Presence publisher.
//!
//! Owns the [`ConnectionRegistry`] and is the only way to mutate it. Each
//! mutation returns the `getOnlineUsers` broadcast that reflects the state
//! after the mutation, so "every register/unregister produces exactly one
//! presence broadcast" holds by construction rather than by call-site
//! discipline.
//!
//! There is no coalescing: a burst of reconnects produces one full broadcast
//! per mutation.

use std::collections::BTreeSet;

use huddle_proto::{ConnectionId, Event, UserId};

use crate::{
    registry::ConnectionRegistry,
    rooms::RoomMembership,
    router::{Delivery, EventRouter},
};

/// Outcome of a presence mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceUpdate {
    /// Online users after the mutation
    pub online: BTreeSet<UserId>,
    /// `getOnlineUsers` delivery to every registered connection
    pub broadcast: Delivery,
    /// Whether this mutation changed the user's online status
    pub transition: PresenceTransition,
}

/// How a mutation affected the user's online status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// First connection of the user
    CameOnline,
    /// Last connection of the user went away
    WentOffline,
    /// User's online status did not change
    Unchanged,
}

/// Registry façade that pairs every mutation with a presence broadcast.
#[derive(Debug, Default)]
pub struct PresencePublisher {
    registry: ConnectionRegistry,
}

impl PresencePublisher {
    /// Create a publisher over an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only access to the registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a connection and produce the presence broadcast.
    pub fn register_and_publish(
        &mut self,
        user_id: &UserId,
        connection_id: ConnectionId,
        rooms: &RoomMembership,
    ) -> PresenceUpdate {
        let was_online = self.registry.is_online(user_id);
        self.registry.register(user_id, connection_id);

        let transition = if !was_online && self.registry.is_online(user_id) {
            PresenceTransition::CameOnline
        } else {
            PresenceTransition::Unchanged
        };
        self.publish(rooms, transition)
    }

    /// Unregister a connection and produce the presence broadcast.
    ///
    /// `transition` is [`PresenceTransition::WentOffline`] only when this was
    /// the user's last connection.
    pub fn unregister_and_publish(
        &mut self,
        user_id: &UserId,
        connection_id: ConnectionId,
        rooms: &RoomMembership,
    ) -> PresenceUpdate {
        let was_online = self.registry.is_online(user_id);
        self.registry.unregister(user_id, connection_id);

        let transition = if was_online && !self.registry.is_online(user_id) {
            PresenceTransition::WentOffline
        } else {
            PresenceTransition::Unchanged
        };
        self.publish(rooms, transition)
    }

    /// Current presence list as an event, without broadcasting.
    pub fn snapshot_event(&self) -> Event {
        Event::online_users(&self.registry.online_user_ids())
    }

    fn publish(&self, rooms: &RoomMembership, transition: PresenceTransition) -> PresenceUpdate {
        let online = self.registry.online_user_ids();
        let broadcast =
            EventRouter::new(&self.registry, rooms).broadcast(Event::online_users(&online));
        PresenceUpdate { online, broadcast, transition }
    }
}

#[cfg(test)]
mod tests {
    use huddle_proto::names;

    use super::*;

    const C1: ConnectionId = ConnectionId::new(1);
    const C2: ConnectionId = ConnectionId::new(2);

    fn online(update: &PresenceUpdate) -> Vec<UserId> {
        update.broadcast.event.payload_as().unwrap()
    }

    #[test]
    fn second_tab_keeps_single_presence_entry() {
        let mut presence = PresencePublisher::new();
        let rooms = RoomMembership::new();
        let alice = UserId::new("alice");

        let first = presence.register_and_publish(&alice, C1, &rooms);
        assert_eq!(first.transition, PresenceTransition::CameOnline);
        assert_eq!(online(&first), vec![alice.clone()]);
        assert_eq!(first.broadcast.connections, vec![C1]);

        let second = presence.register_and_publish(&alice, C2, &rooms);
        assert_eq!(second.transition, PresenceTransition::Unchanged);
        assert_eq!(online(&second), vec![alice.clone()]);
        assert_eq!(second.broadcast.connections, vec![C1, C2]);
    }

    #[test]
    fn offline_only_after_last_connection() {
        let mut presence = PresencePublisher::new();
        let rooms = RoomMembership::new();
        let alice = UserId::new("alice");

        presence.register_and_publish(&alice, C1, &rooms);
        presence.register_and_publish(&alice, C2, &rooms);

        let first = presence.unregister_and_publish(&alice, C1, &rooms);
        assert_eq!(first.transition, PresenceTransition::Unchanged);
        assert!(presence.registry().is_online(&alice));

        let last = presence.unregister_and_publish(&alice, C2, &rooms);
        assert_eq!(last.transition, PresenceTransition::WentOffline);
        assert!(online(&last).is_empty());
        assert!(last.broadcast.connections.is_empty());
    }

    #[test]
    fn every_mutation_publishes() {
        let mut presence = PresencePublisher::new();
        let rooms = RoomMembership::new();
        let alice = UserId::new("alice");

        let update = presence.register_and_publish(&alice, C1, &rooms);
        assert_eq!(update.broadcast.event.name, names::GET_ONLINE_USERS);

        // Idempotent re-register and no-op unregister still publish.
        let again = presence.register_and_publish(&alice, C1, &rooms);
        assert_eq!(again.broadcast.event.name, names::GET_ONLINE_USERS);

        let noop = presence.unregister_and_publish(&UserId::new("bob"), C2, &rooms);
        assert_eq!(noop.transition, PresenceTransition::Unchanged);
        assert_eq!(online(&noop), vec![alice]);
    }
}
