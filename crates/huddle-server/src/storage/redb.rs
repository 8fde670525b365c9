//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Group memberships and last-seen stamps survive server restarts.

use std::{path::Path, sync::Arc};

use huddle_proto::{RoomId, UserId};
use redb::{Database, ReadableTable, TableDefinition};

use super::{Storage, StorageError};

/// Table: group_members
/// Key: [user_len: 4 bytes BE][user_id bytes][group_id bytes]
/// Value: empty
const GROUP_MEMBERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("group_members");

/// Table: last_seen
/// Key: user_id
/// Value: Unix seconds
const LAST_SEEN: TableDefinition<&str, u64> = TableDefinition::new("last_seen");

/// Membership rows carry no value.
const NO_VALUE: &[u8] = &[];

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (GROUP_MEMBERS, LAST_SEEN).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(GROUP_MEMBERS).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(LAST_SEEN).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn group_rooms_for(&self, user_id: &UserId) -> Result<Vec<RoomId>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(GROUP_MEMBERS).map_err(|e| StorageError::Io(e.to_string()))?;

        let prefix = encode_user_prefix(user_id);
        let results =
            table.range(prefix.as_slice()..).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut rooms = Vec::new();
        for result in results {
            let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let Some(group) = key.value().strip_prefix(prefix.as_slice()) else {
                break;
            };

            let group = std::str::from_utf8(group)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            rooms.push(RoomId::new(group));
        }

        Ok(rooms)
    }

    fn add_group_member(&self, group_id: &RoomId, user_id: &UserId) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(GROUP_MEMBERS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_member_key(user_id, group_id);
            table
                .insert(key.as_slice(), NO_VALUE)
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove_group_member(
        &self,
        group_id: &RoomId,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let removed = {
            let mut table =
                txn.open_table(GROUP_MEMBERS).map_err(|e| StorageError::Io(e.to_string()))?;

            let key = encode_member_key(user_id, group_id);
            table.remove(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))?.is_some()
        };
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(removed)
    }

    fn stamp_last_seen(&self, user_id: &UserId, at_secs: u64) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(LAST_SEEN).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(user_id.as_str(), at_secs).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn last_seen(&self, user_id: &UserId) -> Result<Option<u64>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(LAST_SEEN).map_err(|e| StorageError::Io(e.to_string()))?;

        let stamp = table.get(user_id.as_str()).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(stamp.map(|value| value.value()))
    }
}

/// Encode the key prefix shared by all of a user's memberships.
///
/// Layout: [user_len: 4 bytes BE][user_id bytes]
/// The length prefix keeps `("ab", "c")` and `("a", "bc")` apart.
fn encode_user_prefix(user_id: &UserId) -> Vec<u8> {
    let user = user_id.as_str().as_bytes();
    let mut key = Vec::with_capacity(4 + user.len());
    key.extend_from_slice(&(user.len() as u32).to_be_bytes());
    key.extend_from_slice(user);
    key
}

/// Encode (user_id, group_id) as a membership key.
fn encode_member_key(user_id: &UserId, group_id: &RoomId) -> Vec<u8> {
    let mut key = encode_user_prefix(user_id);
    key.extend_from_slice(group_id.as_str().as_bytes());
    key
}
