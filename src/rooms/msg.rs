use axum::{
    Json, debug_handler,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{
    AppResult, AppState, ChatError,
    auth::CallerId,
    db,
    model::SentMessage,
    ordering::MessageId,
    parse_body,
};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Deserialize)]
pub(crate) struct SendMessageBody {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessageResponse {
    message_id: MessageId,
    status: &'static str,
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_message(
    CallerId(sender_id): CallerId,
    Path(room_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    body: Bytes,
) -> AppResult<Response> {
    let SendMessageBody { content, idempotency_key } = parse_body(&body)?;

    let sent = send_message(
        &db_pool,
        &room_id,
        &sender_id,
        &content,
        idempotency_key.as_deref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message_id: sent.message_id,
            status: "sent",
        }),
    )
        .into_response())
}

/// `null`, `""`, `{}` and `[]` carry nothing worth storing.
fn is_empty_content(content: &Value) -> bool {
    match content {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Appends one message to a room.
///
/// The message id is the commit timestamp of the write, so it orders the
/// message for sync as well as identifying it. A repeated `idempotency_key`
/// from the same sender returns the original id without writing anything.
#[tracing::instrument(skip(db_pool, content))]
pub async fn send_message(
    db_pool: &SqlitePool,
    room_id: &str,
    sender_id: &str,
    content: &Value,
    idempotency_key: Option<&str>,
) -> Result<SentMessage, ChatError> {
    if room_id.trim().is_empty() {
        return Err(ChatError::validation("room id must not be empty"));
    }
    if sender_id.trim().is_empty() {
        return Err(ChatError::validation("sender id must not be empty"));
    }
    if is_empty_content(content) {
        return Err(ChatError::validation("content cannot be empty"));
    }
    if let Some(key) = idempotency_key {
        if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(ChatError::validation(format!(
                "idempotency_key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} bytes"
            )));
        }
    }
    let content = content.to_string();

    let mut tx = db_pool.begin().await?;
    let ordering_key = db::next_commit_timestamp(&mut tx).await?;

    let membership = sqlx::query("SELECT 1 FROM memberships WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(sender_id)
        .fetch_optional(&mut *tx)
        .await?;
    if membership.is_none() {
        tx.rollback().await?;
        return Err(ChatError::not_found(format!("room {room_id}")));
    }

    if let Some(key) = idempotency_key {
        let earlier: Option<(MessageId, String)> = sqlx::query_as(
            "SELECT message_id,sender_id FROM messages WHERE room_id=? AND idempotency_key=?",
        )
        .bind(room_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((message_id, earlier_sender)) = earlier {
            tx.rollback().await?;
            if earlier_sender != sender_id {
                return Err(ChatError::validation(
                    "idempotency_key already used in this room",
                ));
            }
            tracing::debug!(%message_id, "replayed send");
            return Ok(SentMessage {
                message_id,
                replayed: true,
            });
        }
    }

    let message_id = MessageId::from_ordering_key(ordering_key);
    sqlx::query(
        "INSERT INTO messages (room_id,message_id,sender_id,content,idempotency_key) VALUES (?,?,?,?,?)",
    )
    .bind(room_id)
    .bind(message_id)
    .bind(sender_id)
    .bind(content)
    .bind(idempotency_key)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(%message_id, "message sent");
    Ok(SentMessage {
        message_id,
        replayed: false,
    })
}
