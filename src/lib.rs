pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod model;
pub mod ordering;
pub mod rooms;
pub mod sync;
pub mod users;

use axum::{
    Json, Router,
    extract::FromRef,
    http::{HeaderName, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::SqlitePool;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

pub use error::ChatError;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

/// The whole HTTP surface.
pub fn router(app_state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(index::index))
        .route("/health", get(index::health))
        .route("/sync", post(sync::post_sync))
        .nest("/rooms", rooms::router())
        .with_state(app_state);
    with_middleware(routes)
}

fn with_middleware(routes: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(auth::USER_ID_HEADER),
        ]);

    // handler panics turn into 500s
    routes
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Decodes a JSON request body, turning any failure into a validation error.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ChatError> {
    serde_json::from_slice(body).map_err(|e| ChatError::validation(format!("invalid body: {e}")))
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub ChatError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Auth(_) => StatusCode::UNAUTHORIZED,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error = match &self.0 {
            ChatError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                "storage unavailable, retry later".to_owned()
            }
            other => {
                tracing::debug!(error = %other, "request rejected");
                other.to_string()
            }
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self(ChatError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use tower::ServiceExt;

    use super::*;

    async fn explode() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn handler_panics_become_500s() {
        let routes = Router::new().route("/boom", get(explode));
        let response = with_middleware(routes)
            .oneshot(axum::http::Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (ChatError::validation("x"), StatusCode::BAD_REQUEST),
            (ChatError::Auth("x".to_owned()), StatusCode::UNAUTHORIZED),
            (ChatError::not_found("x"), StatusCode::NOT_FOUND),
            (ChatError::Storage(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError(err).into_response().status(), status);
        }
    }

    #[test]
    fn bad_json_is_a_validation_error() {
        let err = parse_body::<serde_json::Value>(b"{nope").unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }
}
