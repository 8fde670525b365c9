//! Connection registry: which users are online, and through which
//! connections.
//!
//! Maintains bidirectional mappings: user → connections (for per-user fanout
//! and presence) and connection → user (for O(1) liveness checks and cleanup).
//! A user key exists if and only if its connection set is non-empty, so "is
//! this user online" is answered by key presence alone.
//!
//! Multiple connections per user are expected (several tabs or devices) and
//! are never collapsed here. Deduplication happens in the presence list,
//! which is a set of users.
//!
//! The maps are private. Everything goes through these methods so the
//! backing store can later move behind a shared key-value service without
//! touching callers.

use std::collections::{BTreeSet, HashMap, HashSet};

use huddle_proto::{ConnectionId, UserId};

/// Registry of live, authenticated connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// User ID → set of live connections. Never holds an empty set.
    users: HashMap<UserId, HashSet<ConnectionId>>,
    /// Connection ID → user (reverse index)
    connections: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a user's set, creating the set if absent.
    ///
    /// Idempotent for the same pair. Returns `false` if the connection is
    /// already bound to a different user: a connection's identity is fixed
    /// at handshake and is never rebound.
    pub fn register(&mut self, user_id: &UserId, connection_id: ConnectionId) -> bool {
        match self.connections.get(&connection_id) {
            Some(owner) if owner != user_id => return false,
            Some(_) => return true,
            None => {},
        }

        self.connections.insert(connection_id, user_id.clone());
        self.users.entry(user_id.clone()).or_default().insert(connection_id);
        true
    }

    /// Remove a connection from a user's set, dropping the user key when the
    /// set empties.
    ///
    /// No-op (returns `false`) if the pair is not registered.
    pub fn unregister(&mut self, user_id: &UserId, connection_id: ConnectionId) -> bool {
        if self.connections.get(&connection_id) != Some(user_id) {
            return false;
        }
        self.connections.remove(&connection_id);

        if let Some(set) = self.users.get_mut(user_id) {
            set.remove(&connection_id);
            if set.is_empty() {
                self.users.remove(user_id);
            }
        }

        debug_assert!(self.users.values().all(|set| !set.is_empty()));
        true
    }

    /// Live connections of a user. Empty when the user is offline.
    pub fn connections_for(&self, user_id: &UserId) -> HashSet<ConnectionId> {
        self.users.get(user_id).cloned().unwrap_or_default()
    }

    /// Iterate a user's live connections without cloning the set.
    pub fn iter_connections_for(
        &self,
        user_id: &UserId,
    ) -> impl Iterator<Item = ConnectionId> + '_ {
        self.users.get(user_id).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Whether the user has at least one live connection.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.users.contains_key(user_id)
    }

    /// Snapshot of all online users, sorted.
    pub fn online_user_ids(&self) -> BTreeSet<UserId> {
        self.users.keys().cloned().collect()
    }

    /// User a connection is registered under. `None` if not live.
    pub fn user_for(&self, connection_id: ConnectionId) -> Option<&UserId> {
        self.connections.get(&connection_id)
    }

    /// Whether a connection is registered.
    pub fn is_live(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// All registered connections.
    pub fn all_connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    /// Total number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of distinct online users.
    pub fn online_user_count(&self) -> usize {
        self.users.len()
    }
}
