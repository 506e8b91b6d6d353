//! Multipart upload endpoints.

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sealpost_upload::{UploadOverrides, UploadResult};
use std::sync::Arc;

/// Subdirectory of the upload destination used by `/upload/custom`.
pub const CUSTOM_SUBDIR: &str = "custom";

/// Warnings and partial failures are 429, a request where nothing succeeded is 400.
pub fn status_for(result: &UploadResult) -> StatusCode {
    if result.has_warnings() || (result.has_errors() && !result.files.is_empty()) {
        StatusCode::TOO_MANY_REQUESTS
    } else if result.has_errors() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    }
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

async fn run_upload(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
    overrides: UploadOverrides,
) -> Result<impl IntoResponse, HttpAppError> {
    let result = state
        .uploader
        .upload_with(content_type(headers), body.into_data_stream(), overrides)
        .await?;

    let status = status_for(&result);
    tracing::debug!(
        status = status.as_u16(),
        files = result.files.len(),
        errors = result.errors.len(),
        "Upload finished"
    );
    Ok((status, Json(result)))
}

/// Store the files of a multipart body in the configured destination.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, HttpAppError> {
    run_upload(&state, &headers, body, UploadOverrides::default()).await
}

/// Same as [`upload`], into the `custom` subdirectory of the upload destination.
pub async fn upload_custom(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, HttpAppError> {
    let overrides = UploadOverrides {
        dest: Some(state.config.upload_dest().join(CUSTOM_SUBDIR)),
    };
    run_upload(&state, &headers, body, overrides).await
}
