//! Retrieval of stored files.

use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use std::sync::Arc;

/// Stream a stored file, decrypted when its name carries the cipher marker.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, HttpAppError> {
    let download = state.uploader.download(&name).await?;

    let stream = download.stream.map_err(|e| {
        tracing::warn!(error = %e, "Stored file stream failed");
        std::io::Error::other(e.to_string())
    });
    let mut response = Body::from_stream(stream).into_response();

    if let Some(mime) = download.mime.and_then(|m| HeaderValue::from_str(&m).ok()) {
        response.headers_mut().insert(header::CONTENT_TYPE, mime);
    }
    Ok(response)
}
