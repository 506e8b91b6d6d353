//! Where a request's files end up.

use crate::local::LocalDirectory;
use crate::traits::{ByteSink, ByteStream, SinkDescriptor, StorageError, StorageResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Folder label used when a remote descriptor has no path of its own.
pub const STREAM_FOLDER: &str = "stream://";

/// Destination of one upload request.
#[derive(Clone)]
pub enum Destination {
    Local(LocalDirectory),
    Remote(Arc<dyn SinkDescriptor>),
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Local(dir) => f.debug_tuple("Local").field(&dir.dir()).finish(),
            Destination::Remote(desc) => f.debug_tuple("Remote").field(&desc.path()).finish(),
        }
    }
}

impl Destination {
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Destination::Local(LocalDirectory::new(dir))
    }

    pub fn remote(descriptor: Arc<dyn SinkDescriptor>) -> Self {
        Destination::Remote(descriptor)
    }

    fn descriptor(&self) -> &dyn SinkDescriptor {
        match self {
            Destination::Local(dir) => dir,
            Destination::Remote(desc) => desc.as_ref(),
        }
    }

    /// Checked once per request, before any I/O on file parts.
    pub async fn ensure_writable(&self) -> StorageResult<()> {
        match self {
            Destination::Local(dir) => dir.ensure_writable().await,
            Destination::Remote(_) => Ok(()),
        }
    }

    pub async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn ByteSink>> {
        self.descriptor().create_sink(name).await
    }

    pub async fn delete_failed(&self, name: &str) -> StorageResult<()> {
        self.descriptor().delete_failed(name).await
    }

    pub async fn open(&self, name: &str) -> StorageResult<ByteStream> {
        self.descriptor().open(name).await
    }

    /// Filesystem path of a stored artifact. Only local destinations have one.
    pub fn local_path(&self, name: &str) -> StorageResult<PathBuf> {
        match self {
            Destination::Local(dir) => dir.name_to_path(name),
            Destination::Remote(desc) => Err(StorageError::Unsupported(format!(
                "{} has no local path",
                desc.path()
            ))),
        }
    }

    /// Folder shown in results: the directory, or the remote logical tag.
    pub fn display_folder(&self) -> String {
        match self {
            Destination::Local(dir) => dir.path().to_string(),
            Destination::Remote(desc) if desc.path().is_empty() => STREAM_FOLDER.to_string(),
            Destination::Remote(desc) => desc.path().to_string(),
        }
    }

    /// Display path of a stored artifact.
    pub fn full_path(&self, full_name: &str) -> String {
        match self {
            Destination::Local(dir) => dir.dir().join(full_name).display().to_string(),
            Destination::Remote(_) => {
                format!("{}/{}", self.display_folder().trim_end_matches('/'), full_name)
            }
        }
    }

    /// Whether a file completes only after the sink confirmed receipt.
    pub fn requires_confirmation(&self) -> bool {
        match self {
            Destination::Local(_) => false,
            Destination::Remote(desc) => desc.is_remote(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Destination::Local(_))
    }
}
