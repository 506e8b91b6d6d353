//! Sealpost API Library
//!
//! This crate provides the HTTP surface over the upload pipeline: multipart uploads
//! into the configured destination, a per-request destination override, and
//! retrieval of stored files (decrypted when they were sealed).

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
