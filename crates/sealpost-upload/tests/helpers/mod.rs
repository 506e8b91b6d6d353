pub mod fixtures;
pub mod sinks;

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use sealpost_core::Limits;
use sealpost_storage::Destination;
use sealpost_upload::{UploadOptions, UploadResult, Uploader};
use tempfile::TempDir;

pub const BOUNDARY: &str = "----sealpost-test-boundary";

pub fn content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Test uploader writing into its own temporary directory
pub struct TestUploader {
    pub uploader: Uploader,
    pub dir: TempDir,
}

impl TestUploader {
    pub fn new(configure: impl FnOnce(UploadOptions) -> UploadOptions) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let options = configure(
            UploadOptions::new(Destination::local(dir.path())).timeout(Duration::from_secs(5)),
        );
        let uploader = Uploader::new(options).expect("Failed to build uploader");
        TestUploader { uploader, dir }
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self::new(|options| options.limits(limits))
    }

    pub async fn upload(&self, body: Vec<u8>) -> UploadResult {
        self.uploader
            .upload(Some(&content_type()), chunked(body, 64))
            .await
            .expect("Upload should resolve")
    }

    /// Names of everything stored in the destination directory
    pub fn stored(&self) -> Vec<String> {
        stored_in(self.dir.path())
    }
}

pub fn stored_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Split a body into fixed-size chunks, like a network read would.
pub fn chunked(body: Vec<u8>, size: usize) -> BoxStream<'static, Result<Bytes, std::io::Error>> {
    let chunks: Vec<Result<Bytes, std::io::Error>> = body
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks).boxed()
}
