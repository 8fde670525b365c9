//! End-to-end driver scenarios through the simulation harness.

use std::{collections::HashSet, time::Duration};

use huddle_harness::{SimHub, check_all, sim_env::SIM_EPOCH_SECS};
use huddle_proto::{CloseCode, ConnectionId, Event, RoomId, TypingNotice, UserId, names};
use huddle_server::{ChaoticStorage, DriverConfig, MemoryStorage, Storage, Target};

fn users(ids: &[&str]) -> Vec<UserId> {
    ids.iter().map(|id| UserId::new(*id)).collect()
}

fn set(ids: &[ConnectionId]) -> HashSet<ConnectionId> {
    ids.iter().copied().collect()
}

#[test]
fn two_tabs_then_disconnect_in_order() {
    let mut hub = SimHub::new([("tok-a", "A")]);
    let a = UserId::new("A");

    let c1 = hub.login("tok-a").unwrap();
    assert_eq!(hub.driver().registry().connections_for(&a), set(&[c1]));
    assert_eq!(hub.last_online_users(c1), Some(users(&["A"])));

    let c2 = hub.login("tok-a").unwrap();
    assert_eq!(hub.driver().registry().connections_for(&a), set(&[c1, c2]));
    assert_eq!(hub.last_online_users(c1), Some(users(&["A"])));
    assert_eq!(hub.last_online_users(c2), Some(users(&["A"])));

    hub.disconnect(c1).unwrap();
    assert_eq!(hub.driver().registry().connections_for(&a), set(&[c2]));
    assert!(hub.driver().registry().is_online(&a));
    assert_eq!(hub.last_online_users(c2), Some(users(&["A"])));
    assert_eq!(hub.storage().last_seen(&a).unwrap(), None);

    hub.disconnect(c2).unwrap();
    assert!(!hub.driver().registry().is_online(&a));
    assert!(hub.driver().registry().online_user_ids().is_empty());
    assert_eq!(hub.storage().last_seen(&a).unwrap(), Some(SIM_EPOCH_SECS));

    // register, register, unregister, unregister
    assert_eq!(hub.presence_broadcast_count(), 4);
    check_all(hub.driver()).unwrap();
}

#[test]
fn typing_reaches_everyone_in_group_but_sender() {
    let mut hub = SimHub::new([("tok-a", "A"), ("tok-b", "B"), ("tok-c", "C")]);
    let a = hub.login("tok-a").unwrap();
    let b = hub.login("tok-b").unwrap();
    let c = hub.login("tok-c").unwrap();

    hub.join_group(a, "G1").unwrap();
    hub.join_group(c, "G1").unwrap();
    hub.join_group(b, "G1").unwrap();
    for conn in [a, b, c] {
        hub.take_events(conn);
    }

    hub.typing(b, "G1", true).unwrap();

    for peer in [a, c] {
        let events = hub.take_events(peer);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, names::USER_TYPING);

        let notice: TypingNotice = events[0].payload_as().unwrap();
        assert_eq!(notice.user_id, UserId::new("B"));
        assert_eq!(notice.chat_id, RoomId::new("G1"));
        assert!(notice.is_group);
    }
    assert!(hub.take_events(b).is_empty());
}

#[test]
fn typing_from_non_member_still_reaches_room() {
    let mut hub = SimHub::new([("tok-a", "A"), ("tok-b", "B")]);
    let a = hub.login("tok-a").unwrap();
    let b = hub.login("tok-b").unwrap();
    hub.join_chat(a, "dm-ab").unwrap();
    hub.take_events(a);

    hub.typing(b, "dm-ab", false).unwrap();

    assert_eq!(hub.event_names(a), vec![names::USER_TYPING]);
}

#[test]
fn bootstrap_joins_stored_group_rooms() {
    let storage = MemoryStorage::with_memberships([("g1", "A"), ("g2", "A"), ("g9", "B")]).unwrap();
    let mut hub = SimHub::with_storage(storage, [("tok-a", "A")], DriverConfig::default());

    let c1 = hub.login("tok-a").unwrap();

    let rooms = hub.driver().rooms();
    assert!(rooms.is_member(c1, &RoomId::new("g1")));
    assert!(rooms.is_member(c1, &RoomId::new("g2")));
    assert!(!rooms.is_member(c1, &RoomId::new("g9")));
    assert!(rooms.is_member(c1, &RoomId::new("A")));

    assert_eq!(hub.event_names(c1), vec![names::GET_ONLINE_USERS, names::CONNECTED]);
}

#[test]
fn group_fetch_failure_leaves_only_personal_room() {
    let storage = ChaoticStorage::new(
        MemoryStorage::with_memberships([("g1", "A")]).unwrap(),
        1.0,
    );
    let mut hub = SimHub::with_storage(storage, [("tok-a", "A")], DriverConfig::default());

    let c1 = hub.login("tok-a").unwrap();

    let joined: Vec<_> = hub.driver().rooms().rooms_of(c1).cloned().collect();
    assert_eq!(joined, vec![RoomId::new("A")]);
    assert_eq!(
        hub.driver().session_state(c1),
        Some(huddle_core::SessionState::Authenticated)
    );
    assert!(hub
        .logs()
        .iter()
        .any(|(level, _)| *level == huddle_server::LogLevel::Error));

    // Manual fallback still works
    hub.join_group(c1, "g1").unwrap();
    assert!(hub.driver().rooms().is_member(c1, &RoomId::new("g1")));
}

#[test]
fn last_seen_failure_does_not_suppress_presence() {
    let storage = ChaoticStorage::new(MemoryStorage::new(), 1.0);
    let mut hub =
        SimHub::with_storage(storage, [("tok-a", "A"), ("tok-b", "B")], DriverConfig::default());

    let a = hub.login("tok-a").unwrap();
    let b = hub.login("tok-b").unwrap();
    hub.take_events(b);

    hub.disconnect(a).unwrap();

    assert_eq!(hub.last_online_users(b), Some(users(&["B"])));
    assert_eq!(hub.stamp_failures().len(), 1);
    assert_eq!(hub.stamp_failures()[0].0, UserId::new("A"));
    assert!(!hub.driver().registry().is_online(&UserId::new("A")));
}

#[test]
fn stale_group_rooms_result_is_discarded() {
    let storage = MemoryStorage::with_memberships([("g1", "A")]).unwrap();
    let mut hub = SimHub::with_storage(storage, [("tok-a", "A")], DriverConfig::default());
    hub.set_hold_fetches(true);

    let c1 = hub.login("tok-a").unwrap();
    assert_eq!(hub.pending_fetch_count(), 1);

    hub.disconnect(c1).unwrap();
    assert!(hub.resolve_next_fetch().unwrap());

    assert_eq!(hub.driver().rooms().room_count(), 0);
    check_all(hub.driver()).unwrap();
}

#[test]
fn fetch_resolving_late_still_joins_live_connection() {
    let storage = MemoryStorage::with_memberships([("g1", "A")]).unwrap();
    let mut hub = SimHub::with_storage(storage, [("tok-a", "A")], DriverConfig::default());
    hub.set_hold_fetches(true);

    let c1 = hub.login("tok-a").unwrap();
    assert!(!hub.driver().rooms().is_member(c1, &RoomId::new("g1")));

    hub.resolve_next_fetch().unwrap();
    assert!(hub.driver().rooms().is_member(c1, &RoomId::new("g1")));
}

#[test]
fn server_initiated_add_joins_every_connection() {
    let mut hub = SimHub::new([("tok-a", "A"), ("tok-b", "B")]);
    let a1 = hub.login("tok-a").unwrap();
    let a2 = hub.login("tok-a").unwrap();
    let b = hub.login("tok-b").unwrap();

    hub.add_room_member("A", "g7").unwrap();

    let members = hub.driver().rooms().members_of(&RoomId::new("g7"));
    assert_eq!(members, set(&[a1, a2]));
    assert!(!members.contains(&b));

    hub.remove_room_member("A", "g7").unwrap();
    assert!(hub.driver().rooms().members_of(&RoomId::new("g7")).is_empty());
}

#[test]
fn unauthenticated_connections_never_receive_presence() {
    let mut hub = SimHub::new([("tok-a", "A")]);
    let lurker = hub.connect().unwrap();

    let a = hub.login("tok-a").unwrap();
    hub.disconnect(a).unwrap();

    assert!(hub.events(lurker).is_empty());
}

#[test]
fn failed_auth_sends_error_then_closes() {
    let mut hub = SimHub::new([("tok-a", "A")]);
    let c1 = hub.login("nope").unwrap();

    assert_eq!(hub.event_names(c1), vec![names::AUTH_ERROR]);
    assert_eq!(hub.closes().len(), 1);
    assert_eq!(hub.closes()[0].code, CloseCode::AuthFailed);
    assert_eq!(hub.driver().registry().connection_count(), 0);
    assert_eq!(hub.presence_broadcast_count(), 0);
    assert_eq!(hub.driver().session_state(c1), None);
}

#[test]
fn handshake_timeout_closes_idle_connection() {
    let mut hub = SimHub::new([("tok-a", "A")]);
    let idle = hub.connect().unwrap();
    let a = hub.login("tok-a").unwrap();

    hub.advance(Duration::from_secs(10)).unwrap();
    assert!(hub.closes().is_empty());

    hub.advance(Duration::from_secs(25)).unwrap();
    assert_eq!(hub.closes().len(), 1);
    assert_eq!(hub.closes()[0].connection_id, idle);
    assert_eq!(hub.closes()[0].code, CloseCode::HandshakeTimeout);
    assert!(hub.driver().registry().is_live(a));
}

#[test]
fn server_full_refuses_new_connections() {
    let config = DriverConfig { max_connections: 2, ..Default::default() };
    let mut hub = SimHub::with_storage(MemoryStorage::new(), [("tok-a", "A")], config);

    hub.login("tok-a").unwrap();
    hub.connect().unwrap();
    let refused = hub.connect().unwrap();

    assert_eq!(hub.closes().len(), 1);
    assert_eq!(hub.closes()[0].connection_id, refused);
    assert_eq!(hub.closes()[0].code, CloseCode::ServerFull);
    assert_eq!(hub.driver().connection_count(), 2);
}

#[test]
fn emit_to_offline_user_is_silent() {
    let mut hub = SimHub::new([("tok-a", "A")]);
    let a = hub.login("tok-a").unwrap();
    hub.take_events(a);

    hub.emit(Target::User(UserId::new("ghost")), Event::connected(&UserId::new("ghost"))).unwrap();

    assert!(hub.events(a).is_empty());
    assert!(hub.closes().is_empty());
}

#[test]
fn emit_to_user_reaches_every_tab() {
    let mut hub = SimHub::new([("tok-a", "A"), ("tok-b", "B")]);
    let a1 = hub.login("tok-a").unwrap();
    let a2 = hub.login("tok-a").unwrap();
    let b = hub.login("tok-b").unwrap();
    for conn in [a1, a2, b] {
        hub.take_events(conn);
    }

    let event = Event::group_messages_read(&RoomId::new("g1"), &UserId::new("B"));
    hub.emit(Target::User(UserId::new("A")), event).unwrap();

    assert_eq!(hub.event_names(a1), vec![names::GROUP_MESSAGES_READ]);
    assert_eq!(hub.event_names(a2), vec![names::GROUP_MESSAGES_READ]);
    assert!(hub.events(b).is_empty());
}

#[test]
fn leave_personal_room_is_ignored() {
    let mut hub = SimHub::new([("tok-a", "A"), ("tok-b", "B")]);
    let a = hub.login("tok-a").unwrap();
    let b = hub.login("tok-b").unwrap();

    hub.leave_group(a, "A").unwrap();
    assert!(hub.driver().rooms().is_member(a, &RoomId::new("A")));

    // Leaving someone else's personal room is an ordinary leave
    hub.join_chat(a, "B").unwrap();
    hub.leave_group(a, "B").unwrap();
    assert!(!hub.driver().rooms().is_member(a, &RoomId::new("B")));
    assert!(hub.driver().rooms().is_member(b, &RoomId::new("B")));
}

#[test]
fn mark_group_read_relays_authenticated_reader() {
    let mut hub = SimHub::new([("tok-a", "A"), ("tok-b", "B")]);
    let a = hub.login("tok-a").unwrap();
    let b = hub.login("tok-b").unwrap();
    hub.join_group(a, "g1").unwrap();
    hub.join_group(b, "g1").unwrap();
    hub.take_events(a);
    hub.take_events(b);

    let read = huddle_proto::GroupRead { group_id: RoomId::new("g1"), user_id: UserId::new("A") };
    hub.send(b, huddle_proto::ClientEvent::MarkGroupRead(read)).unwrap();

    let events = hub.take_events(a);
    assert_eq!(events.len(), 1);
    let notice: huddle_proto::ReadNotice = events[0].payload_as().unwrap();
    assert_eq!(notice.user_id, UserId::new("B"));
    assert!(hub.events(b).is_empty());
}
