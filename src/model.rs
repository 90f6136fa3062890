use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;

use crate::ordering::{MessageId, OrderingKey, rfc3339_key};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub user_id: String,
    pub email: String,
    pub public_key: String,
}

/// A room as seen by one of its members.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RoomState {
    pub room_id: String,
    pub name: String,
    pub last_read_message_id: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Message {
    pub room_id: String,
    pub message_id: MessageId,
    pub sender_id: String,
    pub content: Json<Value>,
    #[serde(with = "rfc3339_key")]
    pub created_at: OrderingKey,
}

/// Outcome of a message send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: MessageId,
    /// The idempotency key matched an earlier send; nothing was written.
    pub replayed: bool,
}
