use crate::traits::{ByteSink, ByteStream, SinkDescriptor, SinkReceipt, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStore, ObjectStoreExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// Remote destination backed by an `object_store` implementation.
///
/// Objects are streamed with multipart uploads. A file counts as confirmed only
/// after the upload completed and a `head` request reports the expected size.
#[derive(Clone)]
pub struct ObjectStoreDestination {
    store: Arc<dyn ObjectStore>,
    scheme: String,
    prefix: Option<Path>,
    display: String,
}

impl std::fmt::Debug for ObjectStoreDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreDestination")
            .field("path", &self.display)
            .finish_non_exhaustive()
    }
}

impl ObjectStoreDestination {
    /// Wrap any store. `root` is the bucket or container shown in the logical path.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        scheme: impl Into<String>,
        root: &str,
        prefix: Option<&str>,
    ) -> Self {
        let scheme = scheme.into();
        let prefix = prefix
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(Path::from);
        let display = match &prefix {
            Some(prefix) => format!("{}://{}/{}", scheme, root, prefix),
            None => format!("{}://{}", scheme, root),
        };
        ObjectStoreDestination {
            store,
            scheme,
            prefix,
            display,
        }
    }

    /// Build an S3 (or S3-compatible) destination.
    ///
    /// Credentials are taken from the standard AWS environment variables.
    pub fn s3(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        prefix: Option<&str>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        if let Some(region) = region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = endpoint {
            let allow_http = endpoint.starts_with("http://");
            builder = builder.with_endpoint(endpoint).with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self::new(Arc::new(store), "s3", bucket, prefix))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    fn location(&self, name: &str) -> StorageResult<Path> {
        if name.is_empty() || name.contains("..") || name.contains('/') {
            return Err(StorageError::InvalidKey(
                "Storage name contains invalid characters".to_string(),
            ));
        }
        Ok(match &self.prefix {
            Some(prefix) => prefix.child(name),
            None => Path::from(name),
        })
    }
}

#[async_trait]
impl SinkDescriptor for ObjectStoreDestination {
    fn path(&self) -> &str {
        &self.display
    }

    fn protocol(&self) -> Option<&str> {
        Some(&self.scheme)
    }

    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn ByteSink>> {
        let location = self.location(name)?;
        let writer = BufWriter::new(Arc::clone(&self.store), location.clone());

        Ok(Box::new(ObjectSink {
            store: Arc::clone(&self.store),
            writer,
            location,
            bytes_written: 0,
            started: Instant::now(),
        }))
    }

    async fn delete_failed(&self, name: &str) -> StorageResult<()> {
        let location = self.location(name)?;

        match self.store.delete(&location).await {
            Ok(()) => {
                tracing::info!(store = %self.display, key = %location, "Removed failed upload");
                Ok(())
            }
            Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, store = %self.display, key = %location, "Object delete failed");
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    async fn open(&self, name: &str) -> StorageResult<ByteStream> {
        let location = self.location(name)?;

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(name.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        Ok(result
            .into_stream()
            .map(|chunk| chunk.map_err(|e| StorageError::DownloadFailed(e.to_string())))
            .boxed())
    }
}

/// Multipart upload of one object.
struct ObjectSink {
    store: Arc<dyn ObjectStore>,
    writer: BufWriter,
    location: Path,
    bytes_written: u64,
    started: Instant,
}

#[async_trait]
impl ByteSink for ObjectSink {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.writer
            .write_all(&chunk)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<SinkReceipt> {
        self.writer.shutdown().await.map_err(|e| {
            tracing::error!(
                error = %e,
                key = %self.location,
                size_bytes = self.bytes_written,
                duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
                "Object upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        let confirmed = match self.store.head(&self.location).await {
            Ok(meta) => meta.size == self.bytes_written,
            Err(e) => {
                tracing::warn!(error = %e, key = %self.location, "Object upload not confirmed");
                false
            }
        };

        tracing::info!(
            key = %self.location,
            size_bytes = self.bytes_written,
            confirmed,
            duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            "Object upload finished"
        );

        Ok(SinkReceipt {
            bytes_written: self.bytes_written,
            confirmed,
        })
    }

    async fn abort(mut self: Box<Self>) {
        if let Err(e) = self.writer.abort().await {
            tracing::warn!(error = %e, key = %self.location, "Failed to abort object upload");
        }
    }
}
