use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// Identify this server instance.
pub async fn server_id(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "id": state.config.server_id() }))
}

/// Liveness probe - process is running.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "alive" })),
    )
}
