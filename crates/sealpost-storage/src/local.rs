use crate::traits::{ByteSink, ByteStream, SinkDescriptor, SinkReceipt, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Local directory destination
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    dir: PathBuf,
    display: String,
}

impl LocalDirectory {
    /// Wrap an existing directory. Nothing is created; see [`LocalDirectory::create`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let display = dir.display().to_string();
        LocalDirectory { dir, display }
    }

    /// Create the directory (and parents) with mode 0755, then wrap it.
    pub async fn create(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);

        builder.create(&dir).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fail with `ConfigError` unless the directory exists and accepts new files.
    pub async fn ensure_writable(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.dir).await.map_err(|e| {
            StorageError::ConfigError(format!("{} is not accessible: {}", self.display, e))
        })?;
        if !meta.is_dir() {
            return Err(StorageError::ConfigError(format!(
                "{} is not a directory",
                self.display
            )));
        }

        let probe = self.dir.join(format!(".sealpost-probe-{}", Uuid::new_v4()));
        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)
            .await;
        match created {
            Ok(file) => {
                drop(file);
                if let Err(e) = fs::remove_file(&probe).await {
                    tracing::warn!(path = %probe.display(), error = %e, "Failed to remove write probe");
                }
                Ok(())
            }
            Err(e) => Err(StorageError::ConfigError(format!(
                "{} is not writable: {}",
                self.display, e
            ))),
        }
    }

    /// Convert a storage name to a path inside the directory.
    ///
    /// Names are flat: separators and parent references are rejected.
    pub fn name_to_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty()
            || name == "."
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(StorageError::InvalidKey(
                "Storage name contains invalid characters".to_string(),
            ));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl SinkDescriptor for LocalDirectory {
    fn path(&self) -> &str {
        &self.display
    }

    fn protocol(&self) -> Option<&str> {
        None
    }

    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn ByteSink>> {
        let path = self.name_to_path(name)?;
        let file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        Ok(Box::new(LocalSink {
            file,
            path,
            bytes_written: 0,
            started: Instant::now(),
        }))
    }

    async fn delete_failed(&self, name: &str) -> StorageResult<()> {
        let path = self.name_to_path(name)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Removed failed upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn open(&self, name: &str) -> StorageResult<ByteStream> {
        let path = self.name_to_path(name)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::DownloadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                ))
            }
        })?;

        Ok(ReaderStream::new(file)
            .map(|chunk| chunk.map_err(StorageError::from))
            .boxed())
    }
}

/// Sink writing one file in a local directory.
struct LocalSink {
    file: fs::File,
    path: PathBuf,
    bytes_written: u64,
    started: Instant,
}

#[async_trait]
impl ByteSink for LocalSink {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.file.write_all(&chunk).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to write file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<SinkReceipt> {
        self.file.flush().await?;
        self.file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to sync file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::info!(
            path = %self.path.display(),
            size_bytes = self.bytes_written,
            duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            "Local sink finished"
        );

        Ok(SinkReceipt {
            bytes_written: self.bytes_written,
            confirmed: true,
        })
    }

    async fn abort(self: Box<Self>) {
        tracing::debug!(
            path = %self.path.display(),
            size_bytes = self.bytes_written,
            "Local sink aborted"
        );
    }
}
