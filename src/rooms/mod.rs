mod msg;
mod new;
mod read;

use axum::{Router, routing::post};

use crate::AppState;

pub use msg::send_message;
pub use new::{create_room, join_room};
pub use read::mark_read;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{room_id}/messages", post(msg::post_message))
        .route("/{room_id}/read", post(read::post_read))
}
