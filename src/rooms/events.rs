use serde::{Deserialize, Serialize};

use crate::{auth::Role, db::{Message, Timestamp}};

/// Frames a client sends over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Join { room_id: i64 },
    Leave { room_id: i64 },
    Send { room_id: i64, body: String },
    Typing { room_id: i64, is_typing: bool },
}

/// Frames the server pushes to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined { room_id: i64 },
    Left { room_id: i64 },

    NewMessage { message: Message },

    /// Preview for the counterpart's identity channel.
    NewMessageNotification {
        room_id: i64,
        sender_id: i64,
        sender_role: Role,
        preview: String,
        created_at: Timestamp,
    },

    UserTyping {
        room_id: i64,
        user_id: i64,
        role: Role,
        is_typing: bool,
    },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<i64>,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(room_id: Option<i64>, message: impl ToString) -> Self {
        ServerEvent::Error { room_id, message: message.to_string() }
    }
}
