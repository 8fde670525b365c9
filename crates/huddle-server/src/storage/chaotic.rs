//! Chaotic storage wrapper for fault injection testing
//!
//! Delegates to a real backend but fails a configurable fraction of calls
//! with `StorageError::Io`. Lets tests check that a failing group fetch or
//! last-seen write never blocks presence publication.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use huddle_proto::{RoomId, UserId};

use super::{Storage, StorageError};

/// Default seed used by [`ChaoticStorage::new`].
const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;

/// Storage wrapper that randomly injects failures.
///
/// Clones share the RNG and the operation counter, so a runtime handing
/// clones to blocking tasks still sees one deterministic failure sequence.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
}

/// Linear congruential generator. Reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner`, failing calls with probability `failure_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, DEFAULT_SEED)
    }

    /// Create with explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage, for checking state after chaos.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage calls attempted, failed or not.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Count the call and decide whether it fails.
    fn inject(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        let roll = self
            .rng
            .lock()
            .map_err(|_| StorageError::Io("chaotic rng lock poisoned".to_string()))?
            .next();

        if roll < self.failure_rate {
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn group_rooms_for(&self, user_id: &UserId) -> Result<Vec<RoomId>, StorageError> {
        self.inject()?;
        self.inner.group_rooms_for(user_id)
    }

    fn add_group_member(&self, group_id: &RoomId, user_id: &UserId) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.add_group_member(group_id, user_id)
    }

    fn remove_group_member(
        &self,
        group_id: &RoomId,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        self.inject()?;
        self.inner.remove_group_member(group_id, user_id)
    }

    fn stamp_last_seen(&self, user_id: &UserId, at_secs: u64) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.stamp_last_seen(user_id, at_secs)
    }

    fn last_seen(&self, user_id: &UserId) -> Result<Option<u64>, StorageError> {
        self.inject()?;
        self.inner.last_seen(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn zero_failure_rate_never_fails() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let alice = UserId::new("alice");

        for i in 0..100 {
            chaotic.stamp_last_seen(&alice, i).expect("should not fail with 0% rate");
        }
        assert_eq!(chaotic.operation_count(), 100);
    }

    #[test]
    fn full_failure_rate_always_fails() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let alice = UserId::new("alice");

        for _ in 0..100 {
            let result = chaotic.group_rooms_for(&alice);
            assert!(matches!(result, Err(StorageError::Io(_))));
        }
    }

    #[test]
    fn failed_writes_leave_inner_untouched() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let alice = UserId::new("alice");

        assert!(chaotic.stamp_last_seen(&alice, 5).is_err());
        assert_eq!(chaotic.inner().last_seen(&alice).unwrap(), None);
    }

    #[test]
    fn same_seed_same_failures() {
        let run = |seed| {
            let chaotic = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, seed);
            let bob = UserId::new("bob");
            (0..50).map(|_| chaotic.last_seen(&bob).is_err()).collect::<Vec<_>>()
        };

        assert_eq!(run(7), run(7));
        assert!(run(7).iter().any(|failed| *failed));
        assert!(run(7).iter().any(|failed| !*failed));
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn rejects_out_of_range_rate() {
        let _ = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
