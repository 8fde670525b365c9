#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use huddle_proto::{RoomId, UserId};

use super::{Storage, StorageError};

/// In-memory storage implementation for testing, simulation and development.
///
/// All state is wrapped in `Arc<Mutex<>>` so clones share it. A poisoned
/// lock surfaces as `StorageError::Io` instead of a panic, which lets the
/// error paths of the driver be exercised with this backend too.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// User → groups
    memberships: HashMap<UserId, BTreeSet<RoomId>>,
    /// User → last-seen Unix seconds
    last_seen: HashMap<UserId, u64>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with `(group, user)` memberships.
    pub fn with_memberships<'a>(
        memberships: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, StorageError> {
        let storage = Self::new();
        for (group, user) in memberships {
            storage.add_group_member(&RoomId::new(group), &UserId::new(user))?;
        }
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("memory storage lock poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn group_rooms_for(&self, user_id: &UserId) -> Result<Vec<RoomId>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .memberships
            .get(user_id)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn add_group_member(&self, group_id: &RoomId, user_id: &UserId) -> Result<(), StorageError> {
        self.lock()?.memberships.entry(user_id.clone()).or_default().insert(group_id.clone());
        Ok(())
    }

    fn remove_group_member(
        &self,
        group_id: &RoomId,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        let mut inner = self.lock()?;
        let Some(groups) = inner.memberships.get_mut(user_id) else {
            return Ok(false);
        };

        let removed = groups.remove(group_id);
        if groups.is_empty() {
            inner.memberships.remove(user_id);
        }
        Ok(removed)
    }

    fn stamp_last_seen(&self, user_id: &UserId, at_secs: u64) -> Result<(), StorageError> {
        self.lock()?.last_seen.insert(user_id.clone(), at_secs);
        Ok(())
    }

    fn last_seen(&self, user_id: &UserId) -> Result<Option<u64>, StorageError> {
        Ok(self.lock()?.last_seen.get(user_id).copied())
    }
}
