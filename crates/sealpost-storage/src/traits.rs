//! Sink abstraction traits
//!
//! A destination hands out one `ByteSink` per stored file. Sinks are never shared
//! between files.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stream of stored bytes returned by read operations.
pub type ByteStream = BoxStream<'static, StorageResult<Bytes>>;

/// What a sink reports once every byte has been handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkReceipt {
    pub bytes_written: u64,
    /// True once the receiving end acknowledged the complete object.
    pub confirmed: bool,
}

/// Write side of one stored file.
///
/// `write` applies backpressure by not returning until the sink accepted the chunk.
#[async_trait]
pub trait ByteSink: Send {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Flush and close the sink.
    async fn finish(self: Box<Self>) -> StorageResult<SinkReceipt>;

    /// Stop writing without completing the object. Removing what was written is the
    /// caller's job (`SinkDescriptor::delete_failed`).
    async fn abort(self: Box<Self>);
}

/// Describes a place that can create sinks by storage name.
#[async_trait]
pub trait SinkDescriptor: Send + Sync {
    /// Logical tag used for display and audit, e.g. `s3://bucket/prefix`.
    fn path(&self) -> &str;

    /// Transport protocol, `None` for plain local files.
    fn protocol(&self) -> Option<&str>;

    /// Remote sinks must confirm receipt before a file counts as finished.
    fn is_remote(&self) -> bool {
        self.protocol().is_some_and(|p| p != "file")
    }

    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn ByteSink>>;

    /// Best-effort removal of a partial or rejected artifact. Missing objects are not an error.
    async fn delete_failed(&self, name: &str) -> StorageResult<()>;

    /// Read a stored artifact back.
    async fn open(&self, name: &str) -> StorageResult<ByteStream> {
        Err(StorageError::Unsupported(format!(
            "{} cannot read back {}",
            self.path(),
            name
        )))
    }
}
