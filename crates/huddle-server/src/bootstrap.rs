//! Session bootstrap and teardown.
//!
//! A connection becomes visible to other users in a fixed order: registry
//! entry (with its presence broadcast), personal room, `connected` ack, then
//! a one-off fetch of its group rooms. Teardown runs the reverse: rooms,
//! registry (with its presence broadcast), and a last-seen stamp when the
//! user has no connection left.

use huddle_core::{Environment, SessionState};
use huddle_proto::{CloseCode, ConnectionId, Event, RoomId, UserId};

use crate::{
    auth::{AuthError, Authenticator},
    driver::{LogLevel, ServerAction, ServerDriver, log},
    presence::PresenceTransition,
    router::Delivery,
    server_error::DriverError,
    storage::StorageError,
};

impl<E, A> ServerDriver<E, A>
where
    E: Environment,
    A: Authenticator,
{
    /// Verify the credential of a `Connecting` session and bootstrap it.
    pub(crate) fn handle_hello(
        &mut self,
        connection_id: ConnectionId,
        token: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let user_id = match self.authenticator.authenticate(token) {
            Ok(user_id) => user_id,
            Err(err) => return Ok(self.reject_handshake(connection_id, &err)),
        };

        let session = self
            .sessions
            .get_mut(&connection_id)
            .ok_or(DriverError::ConnectionNotFound(connection_id))?;
        session
            .authenticate(user_id.clone())
            .map_err(|source| DriverError::Session { connection_id, source })?;

        let mut actions = Vec::with_capacity(4);

        let update = self.presence.register_and_publish(&user_id, connection_id, &self.rooms);
        actions.push(ServerAction::Deliver(update.broadcast));

        self.rooms.join_personal(connection_id, &user_id);

        actions.push(ServerAction::Deliver(Delivery {
            connections: vec![connection_id],
            event: Event::connected(&user_id),
        }));
        actions.push(ServerAction::FetchGroupRooms { connection_id, user_id: user_id.clone() });
        actions.push(log(
            LogLevel::Info,
            format!(
                "connection {connection_id} authenticated as {user_id} ({} online)",
                update.online.len()
            ),
        ));

        Ok(actions)
    }

    /// Refuse a handshake: `authError`, then close with `AUTH_FAILED`.
    ///
    /// The session goes straight to `Closed` and never touches the registry.
    pub(crate) fn reject_handshake(
        &mut self,
        connection_id: ConnectionId,
        error: &AuthError,
    ) -> Vec<ServerAction> {
        if let Some(session) = self.sessions.get_mut(&connection_id) {
            session.close();
        }

        let message = error.to_string();
        vec![
            ServerAction::Deliver(Delivery {
                connections: vec![connection_id],
                event: Event::auth_error(&message),
            }),
            ServerAction::CloseConnection {
                connection_id,
                code: CloseCode::AuthFailed,
                reason: message.clone(),
            },
            log(LogLevel::Info, format!("connection {connection_id} failed auth: {message}")),
        ]
    }

    /// Join the group rooms loaded for a bootstrapping connection.
    ///
    /// A result for a connection that closed (or was never bound to that
    /// user) in the meantime is discarded. A failed load leaves the
    /// connection with its personal room only; the client can still
    /// `joinGroup` explicitly.
    pub(crate) fn handle_group_rooms_loaded(
        &mut self,
        connection_id: ConnectionId,
        user_id: &UserId,
        result: Result<Vec<RoomId>, StorageError>,
    ) -> Vec<ServerAction> {
        let current = self.sessions.get(&connection_id).filter(|session| {
            session.state() == SessionState::Authenticated && session.user_id() == Some(user_id)
        });
        if current.is_none() {
            return vec![log(
                LogLevel::Debug,
                format!("discarding group rooms for stale connection {connection_id}"),
            )];
        }

        match result {
            Ok(rooms) => {
                for room_id in &rooms {
                    self.rooms.join(connection_id, room_id);
                }
                vec![log(
                    LogLevel::Debug,
                    format!("connection {connection_id} joined {} group room(s)", rooms.len()),
                )]
            },
            Err(err) => vec![log(
                LogLevel::Error,
                format!("failed to load group rooms for {user_id} on {connection_id}: {err}"),
            )],
        }
    }

    /// Tear down a closed connection.
    ///
    /// Unknown ids are ignored: the driver may already have dropped the
    /// connection, or refused it at accept time.
    pub(crate) fn handle_disconnect(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Vec<ServerAction> {
        let Some(mut session) = self.sessions.remove(&connection_id) else {
            return Vec::new();
        };

        let Some(user_id) = session.close() else {
            return vec![log(
                LogLevel::Debug,
                format!("unauthenticated connection {connection_id} closed: {reason}"),
            )];
        };

        let rooms = self.rooms.drop_connection(connection_id);
        let update = self.presence.unregister_and_publish(&user_id, connection_id, &self.rooms);

        let mut actions = vec![ServerAction::Deliver(update.broadcast)];
        if update.transition == PresenceTransition::WentOffline {
            actions.push(ServerAction::StampLastSeen {
                user_id: user_id.clone(),
                at_secs: self.env.wall_clock_secs(),
            });
        }
        actions.push(log(
            LogLevel::Info,
            format!(
                "connection {connection_id} ({user_id}) closed: {reason}, was in {} rooms",
                rooms.len()
            ),
        ));

        actions
    }
}
