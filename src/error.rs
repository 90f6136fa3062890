use thiserror::Error;

/// Everything that can go wrong in a chat operation.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Malformed or missing input. Fix the request before retrying.
    #[error("invalid request: {0}")]
    Validation(String),
    /// No usable caller identity.
    #[error("unauthorized: {0}")]
    Auth(String),
    /// The caller has no membership for the room (or the room doesn't exist).
    #[error("not found: {0}")]
    NotFound(String),
    /// Contention, unavailability, or any other storage failure. Retryable.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ChatError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ChatError::NotFound(msg.into())
    }
}
