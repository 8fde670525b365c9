//! Invariant checks over driver state.
//!
//! These capture what must hold after every event, whatever the sequence:
//! the registry agrees with itself, every registered connection sits in its
//! personal room, and no room keeps a connection that is gone.

use huddle_core::Environment;
use huddle_server::{Authenticator, ServerDriver};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

fn violation(invariant: &'static str, message: String) -> InvariantResult {
    Err(Violation { invariant, message })
}

/// Run every check.
pub fn check_all<E: Environment, A: Authenticator>(driver: &ServerDriver<E, A>) -> InvariantResult {
    registry_consistent(driver)?;
    personal_rooms_pinned(driver)?;
    no_orphan_memberships(driver)
}

/// A user is online iff it has connections, and each of those maps back.
pub fn registry_consistent<E: Environment, A: Authenticator>(
    driver: &ServerDriver<E, A>,
) -> InvariantResult {
    const NAME: &str = "registry_consistent";
    let registry = driver.registry();

    let mut counted = 0usize;
    for user_id in registry.online_user_ids() {
        let connections = registry.connections_for(&user_id);
        if connections.is_empty() {
            return violation(NAME, format!("{user_id} listed online with no connections"));
        }
        for connection_id in &connections {
            if registry.user_for(*connection_id) != Some(&user_id) {
                return violation(NAME, format!("{connection_id} does not map back to {user_id}"));
            }
        }
        counted += connections.len();
    }

    if counted != registry.connection_count() {
        return violation(
            NAME,
            format!("{counted} connections by user, {} in total", registry.connection_count()),
        );
    }
    Ok(())
}

/// Every registered connection is in its own personal room, pinned.
pub fn personal_rooms_pinned<E: Environment, A: Authenticator>(
    driver: &ServerDriver<E, A>,
) -> InvariantResult {
    const NAME: &str = "personal_rooms_pinned";
    let registry = driver.registry();
    let rooms = driver.rooms();

    for connection_id in registry.all_connections() {
        let Some(user_id) = registry.user_for(connection_id) else {
            return violation(NAME, format!("{connection_id} registered without a user"));
        };
        let personal = user_id.personal_room();
        if !rooms.is_member(connection_id, &personal) {
            return violation(NAME, format!("{connection_id} not in personal room {personal}"));
        }
        if rooms.personal_room_of(connection_id) != Some(&personal) {
            return violation(NAME, format!("{connection_id} personal room not pinned"));
        }
    }
    Ok(())
}

/// Only registered connections hold room memberships.
pub fn no_orphan_memberships<E: Environment, A: Authenticator>(
    driver: &ServerDriver<E, A>,
) -> InvariantResult {
    const NAME: &str = "no_orphan_memberships";

    for connection_id in driver.rooms().connections() {
        if !driver.registry().is_live(connection_id) {
            let rooms: Vec<_> = driver.rooms().rooms_of(connection_id).collect();
            return violation(NAME, format!("{connection_id} gone but still in {rooms:?}"));
        }
    }
    Ok(())
}
