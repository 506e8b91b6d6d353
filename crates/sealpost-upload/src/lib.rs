//! Sealpost Upload Library
//!
//! Orchestrates multipart uploads: every file part gets its own pipeline
//! (transport decode, content sniffing, encryption, sink), limits and the stall
//! timeout are enforced per request, and the outcome of all files is folded into
//! one [`UploadResult`].
//!
//! # Example
//!
//! ```no_run
//! use sealpost_storage::Destination;
//! use sealpost_upload::{UploadOptions, Uploader};
//!
//! # async fn run(body: futures::stream::BoxStream<'static, Result<bytes::Bytes, std::io::Error>>) -> Result<(), sealpost_upload::UploadError> {
//! let uploader = Uploader::new(UploadOptions::new(Destination::local("/var/lib/sealpost")).key("secret"))?;
//! let result = uploader
//!     .upload(Some("multipart/form-data; boundary=X"), body)
//!     .await?;
//! println!("{} stored, {} failed", result.files.len(), result.errors.len());
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod error;
pub mod multipart;
pub mod orchestrator;
pub mod pipeline;
pub mod result;
pub mod uploader;

pub use entry::{FileEntry, FileEvent, FileState};
pub use error::UploadError;
pub use multipart::{
    check_content_type, BodyError, DecoderEvent, DecoderEvents, DecoderLimits, FilePart,
    FileStream, MulterDecoder, MultipartDecoder, PartError, PartSender, RequestBody,
    CONTENT_TYPE_FIELD,
};
pub use orchestrator::{files_limit_warning, UploadPipelineOrchestrator, UPLOAD_ABORTED};
pub use result::{ErrorEntry, FileJson, FormField, UploadResult};
pub use uploader::{Download, UploadOptions, UploadOverrides, Uploader};
