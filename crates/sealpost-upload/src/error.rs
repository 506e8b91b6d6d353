//! Request-scoped upload errors.
//!
//! File-scoped failures never show up here; they are recorded on the file entry and
//! reported in the result.

use sealpost_core::{AppError, CipherError};
use sealpost_processing::StallError;
use sealpost_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Protocol(String),

    #[error(transparent)]
    Timeout(#[from] StallError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Cipher(CipherError),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => UploadError::NotFound(name),
            StorageError::ConfigError(msg) => UploadError::Config(msg),
            other => UploadError::Storage(other),
        }
    }
}

impl From<CipherError> for UploadError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                UploadError::NotFound(io.to_string())
            }
            CipherError::UnsupportedAlgorithm(name) => {
                UploadError::Config(format!("Unsupported cipher algorithm: {}", name))
            }
            other => UploadError::Cipher(other),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Config(msg) => AppError::Config(msg),
            UploadError::Protocol(msg) => AppError::Protocol(msg),
            UploadError::Timeout(stall) => AppError::Timeout(stall.to_string()),
            UploadError::Io(io) => AppError::from(io),
            UploadError::NotFound(name) => AppError::NotFound(name),
            UploadError::Cipher(cipher) => AppError::Cipher(cipher),
            UploadError::Storage(storage) => AppError::Storage(storage.to_string()),
        }
    }
}
