//! Loads a demo user, room and two messages. Safe to run more than once.

use anyhow::Context;
use chatterbox::{
    config::Config,
    db,
    model::NewUser,
    rooms::{create_room, join_room, send_message},
    users::provision_user,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const USER_ID: &str = "user-alice-123";
const ROOM_ID: &str = "room-general-001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatterbox=info")),
        )
        .init();

    let config = Config::from_env()?;
    let db_pool = db::connect(&config.database_url, 1)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;

    provision_user(
        &db_pool,
        &NewUser {
            user_id: USER_ID.to_owned(),
            email: "alice@example.com".to_owned(),
            public_key: "dummy-public-key-base64".to_owned(),
        },
    )
    .await?;
    create_room(&db_pool, Some(ROOM_ID), "General Chat").await?;
    join_room(&db_pool, ROOM_ID, USER_ID).await?;

    let greetings = [
        ("seed-1001", json!({ "text": "Hello World!" })),
        ("seed-1002", json!({ "text": "Is anyone here?" })),
    ];
    for (key, content) in &greetings {
        send_message(&db_pool, ROOM_ID, USER_ID, content, Some(*key)).await?;
    }

    tracing::info!(user = USER_ID, room = ROOM_ID, "seed data inserted");
    Ok(())
}
