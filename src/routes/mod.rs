pub mod auth;
pub mod files;
pub mod health;
pub mod subjects;

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;

use crate::AppState;

/// All `/api` routes, with the upload size limit applied
pub fn api_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .merge(health::router())
        .nest("/api/auth", auth::router())
        .nest("/api/files", files::router())
        .nest("/api/subjects", subjects::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
