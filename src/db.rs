use std::{str::FromStr, time::Duration};

use sqlx::{
    SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use time::OffsetDateTime;

use crate::ordering::OrderingKey;

/// Opens (creating if needed) the database at `url` and brings the schema up to date.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    tracing::debug!(url, "database ready");

    Ok(db_pool)
}

/// Hands out the commit timestamp for the current write transaction.
///
/// Must be the first statement of the transaction: it takes SQLite's write
/// lock, and the value stays reserved until the transaction ends. Values are
/// strictly increasing in commit order and track the wall clock when it moves
/// forward.
pub(crate) async fn next_commit_timestamp(
    conn: &mut SqliteConnection,
) -> Result<OrderingKey, sqlx::Error> {
    let hint = OrderingKey::from_datetime(OffsetDateTime::now_utc());
    let (ts,): (i64,) = sqlx::query_as(
        "UPDATE commit_clock SET last_commit_us = MAX(last_commit_us + 1, ?) WHERE id = 0 RETURNING last_commit_us",
    )
    .bind(hint.0)
    .fetch_one(conn)
    .await?;
    Ok(OrderingKey(ts))
}

/// The newest commit timestamp visible to the current transaction's snapshot.
pub(crate) async fn last_commit_timestamp(
    conn: &mut SqliteConnection,
) -> Result<OrderingKey, sqlx::Error> {
    let (ts,): (i64,) = sqlx::query_as("SELECT last_commit_us FROM commit_clock WHERE id = 0")
        .fetch_one(conn)
        .await?;
    Ok(OrderingKey(ts))
}
