//! Events sent by clients.
//!
//! The first frame on a connection must be [`ClientEvent::Hello`]. Everything
//! else is only accepted once the connection is authenticated.

use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, UserId};

/// Client → server event.
///
/// Serialized adjacently tagged: `{ "event": "joinGroup", "payload": { "groupId": "g1" } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Handshake credential; must be the first frame
    Hello(Hello),
    /// Join a group room
    JoinGroup(GroupRef),
    /// Leave a group room
    LeaveGroup(GroupRef),
    /// Join a direct-chat room
    JoinChat(ChatRef),
    /// Leave a direct-chat room
    LeaveChat(ChatRef),
    /// Sender started typing in a chat
    Typing(TypingSignal),
    /// Sender stopped typing in a chat
    StopTyping(TypingSignal),
    /// Sender has read the group's messages
    MarkGroupRead(GroupRead),
}

impl ClientEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::JoinGroup(_) => "joinGroup",
            Self::LeaveGroup(_) => "leaveGroup",
            Self::JoinChat(_) => "joinChat",
            Self::LeaveChat(_) => "leaveChat",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stopTyping",
            Self::MarkGroupRead(_) => "markGroupRead",
        }
    }
}

/// Handshake payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Externally issued credential, opaque to this layer
    pub token: String,
}

/// `{groupId}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    /// Group room
    pub group_id: RoomId,
}

/// `{chatId}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    /// Direct-chat room
    pub chat_id: RoomId,
}

/// `{chatId, isGroup}` payload of typing signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    /// Room the sender is typing in
    pub chat_id: RoomId,
    /// Whether the room is a group
    #[serde(default)]
    pub is_group: bool,
}

/// `{groupId, userId}` payload of read receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRead {
    /// Group whose messages were read
    pub group_id: RoomId,
    /// Reader, as claimed by the client
    pub user_id: UserId,
}
