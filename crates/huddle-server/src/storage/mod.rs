//! Storage abstraction for the durable collaborator.
//!
//! The presence layer needs exactly two things from the durable store: the
//! group rooms a user belongs to (read once per connection at bootstrap) and
//! a place to stamp last-seen when a user's last connection closes. Group
//! membership writes are exposed for the messaging collaborator and for
//! seeding.
//!
//! The trait is synchronous. The driver never calls it; the runtime runs
//! storage work on the blocking pool so a slow store never stalls the event
//! loop.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
use huddle_proto::{RoomId, UserId};
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// Durable group membership and last-seen timestamps.
///
/// Must be Clone (handed to blocking tasks), Send + Sync, and synchronous.
/// Implementations share internal state via Arc, so clones access the same
/// underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Group rooms the user currently belongs to, sorted.
    ///
    /// Returns an empty list for unknown users.
    fn group_rooms_for(&self, user_id: &UserId) -> Result<Vec<RoomId>, StorageError>;

    /// Record that a user belongs to a group. Idempotent.
    fn add_group_member(&self, group_id: &RoomId, user_id: &UserId) -> Result<(), StorageError>;

    /// Remove a user from a group.
    ///
    /// Returns `false` if the user was not a member.
    fn remove_group_member(&self, group_id: &RoomId, user_id: &UserId)
    -> Result<bool, StorageError>;

    /// Stamp the time (Unix seconds) a user was last seen online.
    ///
    /// Overwrites any previous stamp.
    fn stamp_last_seen(&self, user_id: &UserId, at_secs: u64) -> Result<(), StorageError>;

    /// Last-seen stamp. `None` if the user was never stamped.
    fn last_seen(&self, user_id: &UserId) -> Result<Option<u64>, StorageError>;
}
