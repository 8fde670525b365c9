//! Fuzz target for the server driver under random operation sequences
//!
//! # Strategy
//!
//! - Connects, bad handshakes, idle connections and disconnects
//! - Room joins and leaves, typing, read receipts, garbage frames
//! - Collaborator membership changes and emits
//! - Held group-room fetches resolved out of order with disconnects
//! - Storage failing at a variable rate
//!
//! # Invariants
//!
//! - The driver NEVER returns an error for a connection the transport still holds
//! - Registry, session and room state stay consistent after every step
//! - Every registry mutation yields exactly one presence broadcast

#![no_main]

use arbitrary::Arbitrary;
use huddle_harness::{Operation, SimHub, check_all};
use huddle_server::{ChaoticStorage, DriverConfig, MemoryStorage};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Scenario {
    failure_percent: u8,
    hold_fetches: bool,
    seed: u64,
    max_connections: u8,
    operations: Vec<Operation>,
}

fuzz_target!(|scenario: Scenario| {
    let rate = f64::from(scenario.failure_percent % 91) / 100.0;
    let storage = ChaoticStorage::with_seed(MemoryStorage::new(), rate, scenario.seed);
    let config = DriverConfig {
        max_connections: usize::from(scenario.max_connections).max(1),
        ..Default::default()
    };

    let mut hub = SimHub::for_operations(storage, config);
    hub.set_hold_fetches(scenario.hold_fetches);

    for op in &scenario.operations {
        let before_conns = hub.driver().registry().connection_count();
        let before_broadcasts = hub.presence_broadcast_count();

        hub.apply(op).expect("driver rejected a live connection");

        let delta = before_conns.abs_diff(hub.driver().registry().connection_count());
        assert_eq!(hub.presence_broadcast_count() - before_broadcasts, delta, "{op:?}");
        if let Err(violation) = check_all(hub.driver()) {
            panic!("{op:?}: {violation}");
        }
    }

    while hub.resolve_next_fetch().expect("stale fetch must be discarded") {
        if let Err(violation) = check_all(hub.driver()) {
            panic!("late fetch: {violation}");
        }
    }
});
