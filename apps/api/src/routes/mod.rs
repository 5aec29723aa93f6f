pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::chat::handlers as chat;
use crate::resume::handlers as resume;
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        // Free-form chat
        .route("/chat/generate", post(chat::handle_generate))
        .route("/chat/complete", post(chat::handle_complete))
        // Resume-grounded chat
        .route(
            "/resume/upload",
            post(resume::handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/resume/generate", post(resume::handle_generate))
        .route("/resume/status", get(resume::handle_status))
        .route("/resume", delete(resume::handle_clear))
        .with_state(state)
}
