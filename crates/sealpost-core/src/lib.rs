//! Sealpost Core Library
//!
//! This crate provides the error types, configuration, cipher factory and extension
//! normalization shared across all sealpost components.

pub mod config;
pub mod encryption;
pub mod error;
pub mod file_extensions;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, Limits, ServerConfig, DEFAULT_TIMEOUT_MS};
pub use encryption::{
    CipherAlgorithm, CipherError, CipherStreamFactory, CipherStreams, DecryptedStream, Decryptor,
    Encryptor, IvPrepend, IV_LEN,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use file_extensions::{extension_for_mime, normalize_extension};
pub use storage_types::StorageBackend;
