//! Handle for submitting work into the hub event loop.

use huddle_proto::{ClientEvent, ConnectionId, Event, ProtocolError, RoomId, UserId};
use tokio::sync::mpsc;

use crate::{
    driver::ServerEvent,
    error::ServerError,
    hub::{HubCommand, Outbound},
    router::Target,
};

/// Cloneable entry point into the hub.
///
/// Every call enqueues a command and returns immediately; delivery is
/// fire-and-forget. The only error is [`ServerError::HubClosed`], once the
/// hub loop has stopped.
///
/// The messaging collaborator uses [`emit`](Self::emit) and the room-member
/// calls. Connection tasks use the `connection_*` calls.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<HubCommand>) -> Self {
        Self { commands }
    }

    /// Deliver `event` to `target`. Targets with no live connection are a
    /// silent no-op.
    pub fn emit(&self, target: Target, event: Event) -> Result<(), ServerError> {
        self.submit(ServerEvent::Emit { target, event })
    }

    /// Deliver `event` to every live connection of `user_id`.
    pub fn emit_to_user(&self, user_id: UserId, event: Event) -> Result<(), ServerError> {
        self.emit(Target::User(user_id), event)
    }

    /// Deliver `event` to every member of `room_id`, optionally minus one
    /// connection.
    pub fn emit_to_room(
        &self,
        room_id: RoomId,
        event: Event,
        exclude: Option<ConnectionId>,
    ) -> Result<(), ServerError> {
        self.emit(Target::Room { room_id, exclude }, event)
    }

    /// Join every live connection of `user_id` to `room_id`.
    ///
    /// Connections the user opens later learn the room from the durable
    /// store at bootstrap, so the collaborator should persist the membership
    /// first.
    pub fn add_room_member(&self, user_id: UserId, room_id: RoomId) -> Result<(), ServerError> {
        self.submit(ServerEvent::AddRoomMember { user_id, room_id })
    }

    /// Remove every live connection of `user_id` from `room_id`.
    pub fn remove_room_member(&self, user_id: UserId, room_id: RoomId) -> Result<(), ServerError> {
        self.submit(ServerEvent::RemoveRoomMember { user_id, room_id })
    }

    /// Attach a new connection.
    ///
    /// Returns the receiver the connection's writer task drains, in order.
    pub fn connection_opened(
        &self,
        connection_id: ConnectionId,
    ) -> Result<mpsc::UnboundedReceiver<Outbound>, ServerError> {
        let (outbound, receiver) = mpsc::unbounded_channel();
        self.send(HubCommand::Attach { connection_id, outbound })?;
        Ok(receiver)
    }

    /// Forward a decoded client event.
    pub fn connection_frame(
        &self,
        connection_id: ConnectionId,
        message: ClientEvent,
    ) -> Result<(), ServerError> {
        self.submit(ServerEvent::FrameReceived { connection_id, message })
    }

    /// Report a frame that failed to decode.
    pub fn connection_malformed(
        &self,
        connection_id: ConnectionId,
        error: ProtocolError,
    ) -> Result<(), ServerError> {
        self.submit(ServerEvent::MalformedFrame { connection_id, error })
    }

    /// Report that a connection is gone.
    pub fn connection_closed(
        &self,
        connection_id: ConnectionId,
        reason: impl Into<String>,
    ) -> Result<(), ServerError> {
        self.send(HubCommand::Detach { connection_id, reason: reason.into() })
    }

    pub(crate) fn submit(&self, event: ServerEvent) -> Result<(), ServerError> {
        self.send(HubCommand::Event(event))
    }

    fn send(&self, command: HubCommand) -> Result<(), ServerError> {
        self.commands.send(command).map_err(|_| ServerError::HubClosed)
    }
}
