use sqlx::SqlitePool;

use crate::{ChatError, db, model::NewUser};

/// Creates the user, or overwrites the profile fields of an existing one.
pub async fn provision_user(db_pool: &SqlitePool, user: &NewUser) -> Result<(), ChatError> {
    if user.user_id.trim().is_empty() {
        return Err(ChatError::validation("user_id must not be empty"));
    }

    let mut tx = db_pool.begin().await?;
    let created_at = db::next_commit_timestamp(&mut tx).await?;
    sqlx::query(
        "INSERT INTO users (user_id,email,public_key,created_at) VALUES (?,?,?,?)
         ON CONFLICT (user_id) DO UPDATE SET email=excluded.email, public_key=excluded.public_key",
    )
    .bind(&user.user_id)
    .bind(&user.email)
    .bind(&user.public_key)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.user_id, "provisioned user");
    Ok(())
}
