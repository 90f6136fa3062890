//! Incremental sync.
//!
//! A sync answers "what changed since my cursor" for one user: the full list
//! of rooms they belong to plus every message committed to those rooms after
//! the cursor. Both queries run inside one read transaction, and the cursor
//! handed back is the commit clock as seen by that same snapshot, so the next
//! sync starts exactly where this one stopped.

use axum::{Json, body::Bytes, debug_handler, extract::State};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    AppResult, AppState, ChatError,
    auth::CallerId,
    db,
    model::{Message, RoomState},
    ordering::{Cursor, OrderingKey},
    parse_body,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SyncRequest {
    #[serde(default)]
    last_synced_at: Option<Cursor>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub sync_timestamp: Cursor,
    pub rooms: Vec<RoomState>,
    pub messages: Vec<Message>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_sync(
    CallerId(user_id): CallerId,
    State(db_pool): State<SqlitePool>,
    body: Bytes,
) -> AppResult<Json<SyncResponse>> {
    // an empty body is a first sync
    let request: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        parse_body(&body)?
    };
    let since = request.last_synced_at.unwrap_or(Cursor::BEGINNING);

    Ok(Json(sync(&db_pool, &user_id, since).await?))
}

/// Returns `user_id`'s rooms and the messages committed to them after `since`.
///
/// Messages come back in commit order.
#[tracing::instrument(skip(db_pool))]
pub async fn sync(
    db_pool: &SqlitePool,
    user_id: &str,
    since: Cursor,
) -> Result<SyncResponse, ChatError> {
    let mut snapshot = db_pool.begin().await?;
    let read_timestamp = db::last_commit_timestamp(&mut snapshot).await?;

    let rooms: Vec<RoomState> = sqlx::query_as(
        "SELECT r.room_id, r.name, rm.last_read_message_id
         FROM memberships rm
         JOIN rooms r ON rm.room_id = r.room_id
         WHERE rm.user_id = ?
         ORDER BY r.room_id",
    )
    .bind(user_id)
    .fetch_all(&mut *snapshot)
    .await?;

    let messages = if rooms.is_empty() {
        Vec::new()
    } else {
        new_messages(&mut snapshot, user_id, since.key(), read_timestamp).await?
    };
    snapshot.commit().await?;

    let sync_timestamp = Cursor::at(read_timestamp).max(since);
    tracing::debug!(
        rooms = rooms.len(),
        messages = messages.len(),
        cursor = %sync_timestamp.key(),
        "sync complete"
    );

    Ok(SyncResponse {
        sync_timestamp,
        rooms,
        messages,
    })
}

// Rooms are filtered by joining memberships, not by a bound id list, so the
// parameter count stays fixed.
async fn new_messages(
    conn: &mut SqliteConnection,
    user_id: &str,
    since: OrderingKey,
    until: OrderingKey,
) -> Result<Vec<Message>, sqlx::Error> {
    let mut rows = sqlx::query_as::<_, Message>(
        "SELECT m.room_id, m.message_id, m.sender_id, m.content, m.message_id AS created_at
         FROM messages m INDEXED BY messages_by_time
         JOIN memberships rm ON rm.room_id = m.room_id AND rm.user_id = ?1
         WHERE m.message_id > ?2 AND m.message_id <= ?3
         ORDER BY m.message_id, m.room_id",
    )
    .bind(user_id)
    .bind(since)
    .bind(until)
    .fetch(conn);

    let mut messages = Vec::new();
    while let Some(message) = rows.try_next().await? {
        messages.push(message);
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        db::testing::temp_pool,
        model::NewUser,
        rooms::{create_room, join_room, send_message},
        users::provision_user,
    };

    async fn user(db_pool: &SqlitePool, user_id: &str) {
        provision_user(
            db_pool,
            &NewUser {
                user_id: user_id.to_owned(),
                email: format!("{user_id}@example.com"),
                public_key: "pk".to_owned(),
            },
        )
        .await
        .unwrap();
    }

    async fn room(db_pool: &SqlitePool, room_id: &str, members: &[&str]) {
        create_room(db_pool, Some(room_id), &room_id.to_uppercase()).await.unwrap();
        for member in members {
            join_room(db_pool, room_id, member).await.unwrap();
        }
    }

    fn texts(response: &SyncResponse) -> Vec<(String, Value)> {
        response
            .messages
            .iter()
            .map(|m| (m.room_id.clone(), m.content.0.clone()))
            .collect()
    }

    #[tokio::test]
    async fn two_rooms_then_a_delta() {
        let (db_pool, _dir) = temp_pool().await;
        user(&db_pool, "a").await;
        room(&db_pool, "r1", &["a"]).await;
        room(&db_pool, "r2", &["a"]).await;

        send_message(&db_pool, "r1", "a", &json!("hi"), None).await.unwrap();
        send_message(&db_pool, "r2", "a", &json!("yo"), None).await.unwrap();

        let first = sync(&db_pool, "a", Cursor::BEGINNING).await.unwrap();
        let room_ids: Vec<_> = first.rooms.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(room_ids, ["r1", "r2"]);
        assert_eq!(
            texts(&first),
            [("r1".to_owned(), json!("hi")), ("r2".to_owned(), json!("yo"))]
        );
        let newest = first.messages.last().unwrap().message_id.ordering_key();
        assert!(first.sync_timestamp.key() >= newest);

        send_message(&db_pool, "r1", "a", &json!("again"), None).await.unwrap();
        let second = sync(&db_pool, "a", first.sync_timestamp).await.unwrap();
        assert_eq!(texts(&second), [("r1".to_owned(), json!("again"))]);
        assert_eq!(second.rooms.len(), 2);
        assert!(second.sync_timestamp > first.sync_timestamp);
    }

    #[tokio::test]
    async fn no_memberships_means_nothing() {
        let (db_pool, _dir) = temp_pool().await;
        user(&db_pool, "a").await;
        user(&db_pool, "b").await;
        room(&db_pool, "r1", &["b"]).await;
        send_message(&db_pool, "r1", "b", &json!("secret"), None).await.unwrap();

        let response = sync(&db_pool, "a", Cursor::BEGINNING).await.unwrap();
        assert!(response.rooms.is_empty());
        assert!(response.messages.is_empty());
        assert!(response.sync_timestamp > Cursor::BEGINNING);
    }

    #[tokio::test]
    async fn unknown_user_syncs_empty() {
        let (db_pool, _dir) = temp_pool().await;
        let response = sync(&db_pool, "ghost", Cursor::BEGINNING).await.unwrap();
        assert!(response.rooms.is_empty() && response.messages.is_empty());
        assert_eq!(response.sync_timestamp, Cursor::BEGINNING);
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let (db_pool, _dir) = temp_pool().await;
        user(&db_pool, "a").await;
        room(&db_pool, "r1", &["a"]).await;

        let future = Cursor::parse("2999-01-01T00:00:00Z").unwrap();
        let response = sync(&db_pool, "a", future).await.unwrap();
        assert_eq!(response.sync_timestamp, future);
        assert!(response.messages.is_empty());
    }

    #[tokio::test]
    async fn quiet_rooms_are_still_listed() {
        let (db_pool, _dir) = temp_pool().await;
        user(&db_pool, "a").await;
        room(&db_pool, "r1", &["a"]).await;
        room(&db_pool, "r2", &["a"]).await;
        send_message(&db_pool, "r1", "a", &json!("hi"), None).await.unwrap();

        let first = sync(&db_pool, "a", Cursor::BEGINNING).await.unwrap();
        let second = sync(&db_pool, "a", first.sync_timestamp).await.unwrap();
        assert!(second.messages.is_empty());
        assert_eq!(second.rooms, first.rooms);
    }

    #[tokio::test]
    async fn joining_late_only_delivers_newer_messages() {
        let (db_pool, _dir) = temp_pool().await;
        user(&db_pool, "a").await;
        user(&db_pool, "b").await;
        room(&db_pool, "r1", &["a"]).await;
        room(&db_pool, "r2", &["b"]).await;
        send_message(&db_pool, "r2", "b", &json!("before a joined"), None).await.unwrap();

        let first = sync(&db_pool, "a", Cursor::BEGINNING).await.unwrap();
        assert!(first.messages.is_empty());

        join_room(&db_pool, "r2", "a").await.unwrap();
        send_message(&db_pool, "r2", "b", &json!("after a joined"), None).await.unwrap();

        let second = sync(&db_pool, "a", first.sync_timestamp).await.unwrap();
        assert!(second.rooms.iter().any(|r| r.room_id == "r2"));
        assert_eq!(texts(&second), [("r2".to_owned(), json!("after a joined"))]);
        assert!(
            second
                .messages
                .iter()
                .all(|m| m.message_id.ordering_key() > first.sync_timestamp.key())
        );

        // a full resync still has the whole history
        let full = sync(&db_pool, "a", Cursor::BEGINNING).await.unwrap();
        assert_eq!(full.messages.len(), 2);
    }

    #[tokio::test]
    async fn tens_of_thousands_of_rooms() {
        let (db_pool, _dir) = temp_pool().await;
        user(&db_pool, "a").await;
        sqlx::query(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 33000)
             INSERT INTO rooms (room_id, name, created_at) SELECT 'bulk-' || i, 'Bulk', 1 FROM n",
        )
        .execute(&db_pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO memberships (room_id, user_id, joined_at)
             SELECT room_id, 'a', 1 FROM rooms",
        )
        .execute(&db_pool)
        .await
        .unwrap();
        send_message(&db_pool, "bulk-32999", "a", &json!("deep"), None).await.unwrap();

        let response = sync(&db_pool, "a", Cursor::BEGINNING).await.unwrap();
        assert_eq!(response.rooms.len(), 33_000);
        assert_eq!(texts(&response), [("bulk-32999".to_owned(), json!("deep"))]);
    }
}
