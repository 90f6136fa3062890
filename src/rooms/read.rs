use axum::{
    Json, debug_handler,
    body::Bytes,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{AppResult, AppState, ChatError, auth::CallerId, ordering::MessageId, parse_body};

#[derive(Deserialize)]
pub(crate) struct MarkReadBody {
    last_read_message_id: MessageId,
}

#[derive(Debug, Serialize)]
pub(crate) struct MarkReadResponse {
    room_id: String,
    last_read_message_id: MessageId,
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_read(
    CallerId(user_id): CallerId,
    Path(room_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    body: Bytes,
) -> AppResult<Json<MarkReadResponse>> {
    let MarkReadBody { last_read_message_id } = parse_body(&body)?;
    let last_read_message_id = mark_read(&db_pool, &room_id, &user_id, last_read_message_id).await?;

    Ok(Json(MarkReadResponse {
        room_id,
        last_read_message_id,
    }))
}

/// Moves the member's read marker forward to `message_id`.
///
/// The marker never moves backwards; the stored value is returned.
#[tracing::instrument(skip(db_pool))]
pub async fn mark_read(
    db_pool: &SqlitePool,
    room_id: &str,
    user_id: &str,
    message_id: MessageId,
) -> Result<MessageId, ChatError> {
    let updated: Option<(MessageId,)> = sqlx::query_as(
        "UPDATE memberships SET last_read_message_id = MAX(COALESCE(last_read_message_id, 0), ?3)
         WHERE room_id = ?1 AND user_id = ?2
           AND EXISTS (SELECT 1 FROM messages WHERE room_id = ?1 AND message_id = ?3)
         RETURNING last_read_message_id",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(message_id)
    .fetch_optional(db_pool)
    .await?;

    if let Some((stored,)) = updated {
        tracing::debug!(%stored, "read marker updated");
        return Ok(stored);
    }

    let membership = sqlx::query("SELECT 1 FROM memberships WHERE room_id=? AND user_id=?")
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    match membership {
        None => Err(ChatError::not_found(format!("room {room_id}"))),
        Some(_) => Err(ChatError::validation(format!(
            "no message {message_id} in room {room_id}"
        ))),
    }
}
