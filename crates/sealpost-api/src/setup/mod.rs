//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use sealpost_core::Config;
use sealpost_upload::Uploader;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.is_production())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        storage_backend = %config.storage_backend(),
        "Configuration loaded and validated successfully"
    );

    let uploader = Uploader::from_config(&config)
        .await
        .context("Failed to set up the upload destination")?;

    if !uploader.is_encrypting() {
        tracing::warn!("UPLOAD_KEY is not set, files are stored in plain text");
    }

    let state = Arc::new(AppState::new(config, uploader));
    let router = routes::setup_routes(state.clone());

    Ok((state, router))
}
