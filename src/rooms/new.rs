use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{ChatError, db};

/// Creates a room, or renames it if `room_id` already exists.
///
/// Rooms without a caller-chosen id get a fresh UUIDv7.
pub async fn create_room(
    db_pool: &SqlitePool,
    room_id: Option<&str>,
    name: &str,
) -> Result<String, ChatError> {
    let room_id = match room_id {
        Some(id) if id.trim().is_empty() => {
            return Err(ChatError::validation("room_id must not be empty"));
        }
        Some(id) => id.to_owned(),
        None => Uuid::now_v7().to_string(),
    };

    let mut tx = db_pool.begin().await?;
    let created_at = db::next_commit_timestamp(&mut tx).await?;
    sqlx::query(
        "INSERT INTO rooms (room_id,name,created_at) VALUES (?,?,?)
         ON CONFLICT (room_id) DO UPDATE SET name=excluded.name",
    )
    .bind(&room_id)
    .bind(name)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(%room_id, name, "created room");
    Ok(room_id)
}

/// Adds `user_id` to the room. Returns false if they were already a member.
pub async fn join_room(
    db_pool: &SqlitePool,
    room_id: &str,
    user_id: &str,
) -> Result<bool, ChatError> {
    let mut tx = db_pool.begin().await?;
    let joined_at = db::next_commit_timestamp(&mut tx).await?;

    let room = sqlx::query("SELECT 1 FROM rooms WHERE room_id=?")
        .bind(room_id)
        .fetch_optional(&mut *tx)
        .await?;
    if room.is_none() {
        return Err(ChatError::not_found(format!("room {room_id}")));
    }
    let user = sqlx::query("SELECT 1 FROM users WHERE user_id=?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if user.is_none() {
        return Err(ChatError::not_found(format!("user {user_id}")));
    }

    let inserted = sqlx::query(
        "INSERT INTO memberships (room_id,user_id,joined_at,last_read_message_id) VALUES (?,?,?,NULL)
         ON CONFLICT (room_id,user_id) DO NOTHING",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(joined_at)
    .execute(&mut *tx)
    .await?;
    let joined = inserted.rows_affected() == 1;

    if joined {
        tx.commit().await?;
        tracing::info!(room_id, user_id, "joined room");
    }
    Ok(joined)
}
