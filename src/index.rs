use axum::{Json, debug_handler, extract::State};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{AppResult, AppState};

pub const BANNER: &str = "Chatterbox API is running 🚀";

#[debug_handler]
pub async fn index() -> &'static str {
    BANNER
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    db_check: i64,
}

#[debug_handler(state = AppState)]
pub async fn health(State(db_pool): State<SqlitePool>) -> AppResult<Json<HealthResponse>> {
    let (db_check,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&db_pool).await?;

    Ok(Json(HealthResponse {
        status: "ok",
        db_check,
    }))
}
