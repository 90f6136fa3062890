use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{AppError, ChatError};

/// Header carrying the already-authenticated caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user on whose behalf a request runs.
///
/// Identity is established upstream; this only lifts it out of the request
/// and rejects requests that arrive without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Err(ChatError::Auth("missing X-User-ID header".to_owned()).into());
        };
        // ids are opaque, so anything that decodes as UTF-8 is accepted
        let user_id = std::str::from_utf8(value.as_bytes())
            .map_err(|_| ChatError::Auth("X-User-ID is not valid UTF-8".to_owned()))?
            .trim();
        if user_id.is_empty() {
            return Err(ChatError::Auth("empty X-User-ID header".to_owned()).into());
        }

        Ok(CallerId(user_id.to_owned()))
    }
}
