//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`; every domain error is
//! converted into an `AppError` first so status, body and logging stay consistent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sealpost_core::{AppError, ErrorMetadata, LogLevel};
use sealpost_upload::UploadError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse
/// This is necessary because of Rust's orphan rules - we can't implement
/// IntoResponse (external trait) for AppError (external type from sealpost-core)
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<UploadError> for HttpAppError {
    fn from(err: UploadError) -> Self {
        HttpAppError(err.into())
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Error occurred");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

impl HttpAppError {
    fn body(&self, is_production: bool) -> ErrorResponse {
        let app_error = &self.0;
        let (details, error_type) = if is_production || app_error.is_sensitive() {
            (None, None)
        } else {
            (
                Some(app_error.detailed_message()),
                Some(app_error.error_type().to_string()),
            )
        };

        ErrorResponse {
            error: app_error.client_message(),
            details,
            error_type,
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
            suggested_action: app_error.suggested_action().map(String::from),
        }
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(&self.0);

        // Always hide details in production; elsewhere only for non-sensitive errors.
        let body = self.body(is_production_env());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpost_processing::StallError;
    use std::time::Duration;

    #[test]
    fn test_timeout_is_request_timeout() {
        let err: HttpAppError = UploadError::Timeout(StallError {
            window: Duration::from_millis(10),
        })
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err: HttpAppError = UploadError::NotFound("a.png".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_config_details_are_hidden() {
        let err = HttpAppError(AppError::Config("UPLOAD_KEY leaked".into()));
        let body = err.body(false);
        assert!(body.details.is_none());
        assert!(!body.error.contains("UPLOAD_KEY"));
    }

    #[test]
    fn test_error_response_shape() {
        let err = HttpAppError(AppError::Protocol("Multipart: Boundary not found".into()));
        let json = serde_json::to_value(err.body(false)).expect("serialize");
        assert_eq!(json["error"], "Multipart: Boundary not found");
        assert!(json.get("code").and_then(|v| v.as_str()).is_some());
        assert!(json.get("recoverable").and_then(|v| v.as_bool()).is_some());
        assert!(json.get("details").is_some());

        let json = serde_json::to_value(err.body(true)).expect("serialize");
        assert!(json.get("details").is_none());
    }
}
