//! Entry point for callers: validates options once, runs one orchestrator per request,
//! and reads stored files back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use sealpost_core::{CipherStreamFactory, Config, Limits, DEFAULT_TIMEOUT_MS};
use sealpost_processing::{sniff, NameGenerator, NO_EXTENSION};
use sealpost_storage::{create_destination, Destination, LocalDirectory};
use uuid::Uuid;

use crate::error::UploadError;
use crate::multipart::{check_content_type, BodyError, MulterDecoder, RequestBody};
use crate::orchestrator::UploadPipelineOrchestrator;
use crate::result::UploadResult;

/// Options shared by every request of an [`Uploader`].
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub destination: Destination,
    /// Passphrase. Presence turns on encryption for every file.
    pub key: Option<String>,
    pub algorithm: Option<String>,
    pub limits: Limits,
    /// Stall window for the request body. Zero disables it.
    pub timeout: Duration,
}

impl UploadOptions {
    pub fn new(destination: Destination) -> Self {
        UploadOptions {
            destination,
            key: None,
            algorithm: None,
            limits: Limits::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn from_config(config: &Config) -> Result<Self, UploadError> {
        let destination = create_destination(config).await?;
        Ok(UploadOptions {
            destination,
            key: config.upload_key().map(str::to_string),
            algorithm: config.upload_algorithm().map(str::to_string),
            limits: config.limits(),
            timeout: config.upload_timeout(),
        })
    }
}

/// Per-request changes to the uploader's options.
#[derive(Debug, Clone, Default)]
pub struct UploadOverrides {
    /// Local directory used instead of the configured destination. Created when missing.
    pub dest: Option<PathBuf>,
}

/// A stored file opened for reading.
pub struct Download {
    pub stream: BoxStream<'static, Result<Bytes, UploadError>>,
    /// Sniffed from the content, or guessed from the name.
    pub mime: Option<String>,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("mime", &self.mime)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Uploader {
    options: Arc<UploadOptions>,
    cipher: Option<CipherStreamFactory>,
}

impl Uploader {
    pub fn new(options: UploadOptions) -> Result<Self, UploadError> {
        let cipher = match (&options.key, &options.algorithm) {
            (Some(key), algorithm) => Some(CipherStreamFactory::from_options(key, algorithm.as_deref())?),
            (None, Some(_)) => {
                return Err(UploadError::Config(
                    "a cipher algorithm was given without a key".to_string(),
                ))
            }
            (None, None) => None,
        };

        tracing::info!(
            destination = %options.destination.display_folder(),
            encrypted = cipher.is_some(),
            algorithm = ?cipher.as_ref().map(|c| c.algorithm().to_string()),
            max_file_size = ?options.limits.file_size,
            max_files = ?options.limits.files,
            sniffing = options.limits.sniffing_enabled(),
            timeout_ms = options.timeout.as_millis() as u64,
            "Uploader configured"
        );

        Ok(Uploader {
            options: Arc::new(options),
            cipher,
        })
    }

    pub async fn from_config(config: &Config) -> Result<Self, UploadError> {
        Self::new(UploadOptions::from_config(config).await?)
    }

    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    pub async fn upload<S, E>(
        &self,
        content_type: Option<&str>,
        body: S,
    ) -> Result<UploadResult, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BodyError>,
    {
        self.upload_with(content_type, body, UploadOverrides::default())
            .await
    }

    /// Upload one multipart body.
    ///
    /// Requests that are not `multipart/form-data` resolve with a single error and no
    /// body is read. A malformed boundary is a protocol error.
    pub async fn upload_with<S, E>(
        &self,
        content_type: Option<&str>,
        body: S,
        overrides: UploadOverrides,
    ) -> Result<UploadResult, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BodyError>,
    {
        let span = tracing::info_span!("upload", request_id = %Uuid::new_v4());

        let content_type = match check_content_type(content_type) {
            Ok(content_type) => content_type,
            Err(message) => {
                span.in_scope(|| tracing::warn!(error = %message, "Upload rejected"));
                return Ok(UploadResult::rejected(message));
            }
        };
        let decoder = MulterDecoder::from_content_type(content_type).map_err(UploadError::Protocol)?;

        let destination = match overrides.dest {
            Some(dir) => Destination::Local(LocalDirectory::create(dir).await?),
            None => self.options.destination.clone(),
        };

        let body: RequestBody = body.map(|chunk| chunk.map_err(Into::into)).boxed();

        UploadPipelineOrchestrator::new(
            destination,
            self.options.limits.clone(),
            self.cipher.clone(),
            self.options.timeout,
        )
        .with_span(span)
        .process(body, decoder)
        .await
    }

    /// Open a stored file. Names carrying the cipher marker are decrypted on the fly,
    /// which needs a local destination and the upload key.
    pub async fn download(&self, name: &str) -> Result<Download, UploadError> {
        let destination = &self.options.destination;

        let mut stream: BoxStream<'static, Result<Bytes, UploadError>> =
            if NameGenerator::is_ciphered(name) {
                let cipher = self.cipher.as_ref().ok_or_else(|| {
                    UploadError::Config(format!("no key configured to decrypt {}", name))
                })?;
                let path = destination.local_path(name)?;
                cipher
                    .decrypt_file(path)
                    .await?
                    .map(|chunk| chunk.map_err(UploadError::from))
                    .boxed()
            } else {
                destination
                    .open(name)
                    .await?
                    .map(|chunk| chunk.map_err(UploadError::from))
                    .boxed()
            };

        let mut first = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.is_empty() {
                first = Some(chunk);
                break;
            }
        }

        let mime = first
            .as_deref()
            .and_then(sniff)
            .map(|found| found.mime)
            .or_else(|| {
                let ext = NameGenerator::extension_of(name);
                (ext != NO_EXTENSION)
                    .then(|| mime_guess::from_ext(&ext).first())
                    .flatten()
                    .map(|m| m.to_string())
            });

        tracing::debug!(name = %name, mime = ?mime, "Serving stored file");

        Ok(Download {
            stream: stream::iter(first.map(Ok)).chain(stream).boxed(),
            mime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_without_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = UploadOptions::new(Destination::local(dir.path())).algorithm("aes-256-cbc");
        assert!(matches!(Uploader::new(options), Err(UploadError::Config(_))));
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = UploadOptions::new(Destination::local(dir.path()))
            .key("secret")
            .algorithm("rot13");
        assert!(matches!(Uploader::new(options), Err(UploadError::Config(_))));
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_rejected_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Uploader::new(UploadOptions::new(Destination::local(dir.path()))).unwrap();

        let body = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"{}"))]);
        let result = uploader.upload(Some("application/json"), body).await.unwrap();
        assert_eq!(result.error_messages(), vec!["no multipart/form-data; header found"]);

        let body = stream::iter(Vec::<Result<Bytes, std::io::Error>>::new());
        let result = uploader.upload(None, body).await.unwrap();
        assert_eq!(result.error_messages(), vec!["Missing Content-Type"]);
    }

    #[tokio::test]
    async fn test_missing_boundary_is_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Uploader::new(UploadOptions::new(Destination::local(dir.path()))).unwrap();
        let body = stream::iter(Vec::<Result<Bytes, std::io::Error>>::new());
        let err = uploader
            .upload(Some("multipart/form-data"), body)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Uploader::new(UploadOptions::new(Destination::local(dir.path())).key("k")).unwrap();
        assert!(matches!(
            uploader.download("nope.png").await,
            Err(UploadError::NotFound(_))
        ));
        assert!(matches!(
            uploader.download("nope-ciphered.png").await,
            Err(UploadError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ciphered_download_needs_key() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Uploader::new(UploadOptions::new(Destination::local(dir.path()))).unwrap();
        assert!(matches!(
            uploader.download("x-ciphered.png").await,
            Err(UploadError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_download_guesses_mime_from_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body { color: red; }").unwrap();
        std::fs::write(dir.path().join("blob.zzqx"), "opaque").unwrap();
        let uploader = Uploader::new(UploadOptions::new(Destination::local(dir.path()))).unwrap();

        let css = uploader.download("style.css").await.unwrap();
        assert_eq!(css.mime.as_deref(), Some("text/css"));
        let body: Vec<u8> = css.stream.map(|c| c.unwrap().to_vec()).concat().await;
        assert_eq!(body, b"body { color: red; }");

        let unknown = uploader.download("blob.zzqx").await.unwrap();
        assert_eq!(unknown.mime, None);
    }
}
