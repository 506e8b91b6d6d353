//! Route configuration and setup.

use crate::handlers::{download, root, upload};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router<()> {
    // Bodies are streamed; per-file limits are enforced by the uploader.
    let upload_routes = Router::new()
        .route("/upload", post(upload::upload))
        .route("/upload/custom", post(upload::upload_custom))
        .layer(DefaultBodyLimit::disable());

    Router::new()
        .route("/", get(root::server_id))
        .route("/health", get(root::liveness_check))
        .route("/file/{name}", get(download::get_file))
        .merge(upload_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
