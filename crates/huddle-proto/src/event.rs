//! Events fanned out by the server.
//!
//! An [`Event`] is a name plus a CBOR value. The router never looks inside the
//! payload: events built here for presence, typing and read receipts have
//! typed payload structs, while events owned by the messaging collaborator
//! (`newMessage` and friends) are built with [`Event::with_payload`] and
//! forwarded as-is.

use ciborium::Value;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    errors::{ProtocolError, Result},
    ids::{RoomId, UserId},
};

/// Well-known server → client event names.
pub mod names {
    /// Handshake accepted, payload [`super::Connected`]
    pub const CONNECTED: &str = "connected";
    /// Handshake rejected, payload [`super::AuthErrorNotice`]
    pub const AUTH_ERROR: &str = "authError";
    /// Global presence list, payload is an array of user ids
    pub const GET_ONLINE_USERS: &str = "getOnlineUsers";
    /// Peer started typing, payload [`super::TypingNotice`]
    pub const USER_TYPING: &str = "userTyping";
    /// Peer stopped typing, payload [`super::TypingNotice`]
    pub const USER_STOP_TYPING: &str = "userStopTyping";
    /// Peer read the group, payload [`super::ReadNotice`]
    pub const GROUP_MESSAGES_READ: &str = "groupMessagesRead";

    // Owned by the messaging collaborator; payloads are opaque here.

    /// Direct message delivered
    pub const NEW_MESSAGE: &str = "newMessage";
    /// Group message delivered
    pub const NEW_GROUP_MESSAGE: &str = "newGroupMessage";
    /// Message edited
    pub const MESSAGE_EDITED: &str = "messageEdited";
    /// Message deleted
    pub const MESSAGE_DELETED: &str = "messageDeleted";
    /// Reactions on a message changed
    pub const REACTION_UPDATED: &str = "reactionUpdated";
    /// Direct messages marked read
    pub const MESSAGES_READ: &str = "messagesRead";
    /// Recipient was added to a group
    pub const ADDED_TO_GROUP: &str = "addedToGroup";
    /// Recipient was removed from a group
    pub const REMOVED_FROM_GROUP: &str = "removedFromGroup";
}

/// Server → client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    #[serde(rename = "event")]
    pub name: String,
    /// Event payload
    pub payload: Value,
}

impl Event {
    /// Event with an already-built payload.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self { name: name.into(), payload }
    }

    /// Event with a payload serialized from any `Serialize` value.
    pub fn with_payload<T: Serialize + ?Sized>(
        name: impl Into<String>,
        payload: &T,
    ) -> Result<Self> {
        let payload = Value::serialized(payload).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(Self::new(name, payload))
    }

    /// Deserialize the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.payload.deserialized().map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// `connected {userId}`
    pub fn connected(user_id: &UserId) -> Self {
        Self::new(names::CONNECTED, map([("userId", text(user_id.as_str()))]))
    }

    /// `authError {message}`
    pub fn auth_error(message: &str) -> Self {
        Self::new(names::AUTH_ERROR, map([("message", text(message))]))
    }

    /// `getOnlineUsers [userId...]`, in iteration order.
    pub fn online_users<'a>(users: impl IntoIterator<Item = &'a UserId>) -> Self {
        let list = users.into_iter().map(|u| text(u.as_str())).collect();
        Self::new(names::GET_ONLINE_USERS, Value::Array(list))
    }

    /// `userTyping {chatId, userId, isGroup}`
    pub fn user_typing(chat_id: &RoomId, user_id: &UserId, is_group: bool) -> Self {
        Self::new(names::USER_TYPING, typing_payload(chat_id, user_id, is_group))
    }

    /// `userStopTyping {chatId, userId, isGroup}`
    pub fn user_stop_typing(chat_id: &RoomId, user_id: &UserId, is_group: bool) -> Self {
        Self::new(names::USER_STOP_TYPING, typing_payload(chat_id, user_id, is_group))
    }

    /// `groupMessagesRead {groupId, userId}`
    pub fn group_messages_read(group_id: &RoomId, user_id: &UserId) -> Self {
        Self::new(
            names::GROUP_MESSAGES_READ,
            map([("groupId", text(group_id.as_str())), ("userId", text(user_id.as_str()))]),
        )
    }
}

/// Payload of [`names::CONNECTED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    /// Identity the credential resolved to
    pub user_id: UserId,
}

/// Payload of [`names::AUTH_ERROR`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorNotice {
    /// Human-readable reason
    pub message: String,
}

/// Payload of [`names::USER_TYPING`] and [`names::USER_STOP_TYPING`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    /// Room the typing happened in
    pub chat_id: RoomId,
    /// Who is typing
    pub user_id: UserId,
    /// Whether the room is a group
    pub is_group: bool,
}

/// Payload of [`names::GROUP_MESSAGES_READ`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotice {
    /// Group that was read
    pub group_id: RoomId,
    /// Reader
    pub user_id: UserId,
}

fn typing_payload(chat_id: &RoomId, user_id: &UserId, is_group: bool) -> Value {
    map([
        ("chatId", text(chat_id.as_str())),
        ("userId", text(user_id.as_str())),
        ("isGroup", Value::Bool(is_group)),
    ])
}

fn text(s: &str) -> Value {
    Value::Text(s.to_owned())
}

fn map<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (text(k), v)).collect())
}
