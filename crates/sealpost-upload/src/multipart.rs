//! Multipart decoding seam.
//!
//! The orchestrator consumes `DecoderEvent`s and never parses bodies itself.
//! `MulterDecoder` is the production decoder; tests can plug in scripted ones.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Field name browsers and some clients send for the part's content type.
pub const CONTENT_TYPE_FIELD: &str = "Content-Type";

/// Transfer encoding assumed when a part does not declare one.
pub const DEFAULT_TRANSFER_ENCODING: &str = "7bit";

/// Chunks buffered per file part before the decoder waits for the pipeline.
pub const FILE_CHANNEL_CAPACITY: usize = 8;

pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// Raw request body.
pub type RequestBody = BoxStream<'static, Result<Bytes, BodyError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartError {
    /// The part exceeded the per-file byte limit. Everything up to the limit was delivered.
    #[error("file exceeded the limit of {limit} bytes")]
    LimitExceeded { limit: u64 },

    #[error("{0}")]
    Stream(String),
}

/// Raw bytes of one file part.
pub struct FileStream {
    inner: BoxStream<'static, Result<Bytes, PartError>>,
}

impl FileStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, PartError>> + Send + 'static,
    {
        FileStream {
            inner: stream.boxed(),
        }
    }

    /// Bounded channel feeding a file stream.
    ///
    /// The stream ends cleanly only after [`PartSender::finish`]. If the sender is
    /// dropped first, the stream yields a `PartError::Stream` instead.
    pub fn channel(capacity: usize) -> (PartSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let inner = stream::unfold(Some(rx), |rx| async move {
            let mut rx = rx?;
            match rx.recv().await {
                Some(Frame::Data(item)) => Some((item, Some(rx))),
                Some(Frame::End) => None,
                None => Some((Err(PartError::Stream(PART_CUT_SHORT.to_string())), None)),
            }
        });
        (PartSender { tx }, FileStream::new(inner))
    }
}

const PART_CUT_SHORT: &str = "file part ended before its data was complete";

enum Frame {
    Data(Result<Bytes, PartError>),
    End,
}

/// Feeding side of [`FileStream::channel`].
pub struct PartSender {
    tx: mpsc::Sender<Frame>,
}

impl PartSender {
    /// Waits for room in the channel. Fails once the reading side is gone.
    pub async fn send(&self, item: Result<Bytes, PartError>) -> Result<(), PartError> {
        self.tx
            .send(Frame::Data(item))
            .await
            .map_err(|_| PartError::Stream("file stream closed".to_string()))
    }

    /// Mark the part as complete.
    pub async fn finish(self) {
        let _ = self.tx.send(Frame::End).await;
    }
}

impl Stream for FileStream {
    type Item = Result<Bytes, PartError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub encoding: String,
    pub mime_type: String,
    pub stream: FileStream,
}

#[derive(Debug)]
pub enum DecoderEvent {
    Field { name: String, value: String },
    File(FilePart),
    /// The per-request file cap was reached. Sent once; later file parts are skipped.
    FilesLimit,
    /// The body could not be parsed any further.
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderLimits {
    pub file_size: Option<u64>,
    pub files: Option<usize>,
}

/// Events of one body. The end of the stream means parsing finished.
pub struct DecoderEvents {
    events: BoxStream<'static, DecoderEvent>,
    task: Option<AbortHandle>,
}

impl DecoderEvents {
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = DecoderEvent> + Send + 'static,
    {
        DecoderEvents {
            events: events.boxed(),
            task: None,
        }
    }

    /// Events produced by a background task, which is aborted with the stream.
    pub fn from_task(rx: mpsc::Receiver<DecoderEvent>, task: AbortHandle) -> Self {
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        DecoderEvents {
            events: events.boxed(),
            task: Some(task),
        }
    }

    pub async fn next(&mut self) -> Option<DecoderEvent> {
        self.events.next().await
    }

    /// Stop decoding. No further events are produced.
    pub fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events = stream::empty().boxed();
    }
}

impl Drop for DecoderEvents {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Turns a request body into [`DecoderEvent`]s.
///
/// Every file stream handed out must end or fail once the decoder stops, including
/// when [`DecoderEvents::abort`] is called.
pub trait MultipartDecoder {
    fn start(self, body: RequestBody, limits: DecoderLimits) -> DecoderEvents;
}

/// Reject requests that are not `multipart/form-data` before touching the body.
pub fn check_content_type(content_type: Option<&str>) -> Result<&str, String> {
    let content_type = match content_type.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Err("Missing Content-Type".to_string()),
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence != "multipart/form-data" {
        return Err("no multipart/form-data; header found".to_string());
    }

    Ok(content_type)
}

/// Multipart decoder over the `multer` crate.
#[derive(Debug, Clone)]
pub struct MulterDecoder {
    boundary: String,
}

impl MulterDecoder {
    pub fn new(boundary: impl Into<String>) -> Self {
        MulterDecoder {
            boundary: boundary.into(),
        }
    }

    pub fn from_content_type(content_type: &str) -> Result<Self, String> {
        multer::parse_boundary(content_type)
            .map(Self::new)
            .map_err(|_| "Multipart: Boundary not found".to_string())
    }
}

impl MultipartDecoder for MulterDecoder {
    fn start(self, body: RequestBody, limits: DecoderLimits) -> DecoderEvents {
        let (tx, rx) = mpsc::channel(FILE_CHANNEL_CAPACITY);
        let multipart = multer::Multipart::new(body, self.boundary);
        let task = tokio::spawn(decode(multipart, limits, tx));
        DecoderEvents::from_task(rx, task.abort_handle())
    }
}

async fn decode(
    mut multipart: multer::Multipart<'static>,
    limits: DecoderLimits,
    events: mpsc::Sender<DecoderEvent>,
) {
    let mut files_seen = 0usize;
    let mut limit_reported = false;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let _ = events.send(DecoderEvent::Error(e.to_string())).await;
                return;
            }
        };

        let name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            match field.text().await {
                Ok(value) => {
                    if events.send(DecoderEvent::Field { name, value }).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = events.send(DecoderEvent::Error(e.to_string())).await;
                    return;
                }
            }
            continue;
        };

        files_seen += 1;
        if let Some(max) = limits.files.filter(|max| files_seen > *max) {
            if !limit_reported {
                limit_reported = true;
                tracing::debug!(limit = max, "File count limit reached");
                if events.send(DecoderEvent::FilesLimit).await.is_err() {
                    return;
                }
            }
            // Skip the part without materializing it.
            loop {
                match field.chunk().await {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        let _ = events.send(DecoderEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }
            continue;
        }

        let encoding = field
            .headers()
            .get("content-transfer-encoding")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_TRANSFER_ENCODING.to_string());
        let mime_type = field
            .content_type()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let (chunks, stream) = FileStream::channel(FILE_CHANNEL_CAPACITY);
        let part = FilePart {
            field_name: name,
            file_name,
            encoding,
            mime_type,
            stream,
        };
        if events.send(DecoderEvent::File(part)).await.is_err() {
            return;
        }

        if let Err(e) = pump_file(&mut field, chunks, limits.file_size).await {
            let _ = events.send(DecoderEvent::Error(e.to_string())).await;
            return;
        }
    }
}

/// Forward one part's bytes. Past the limit the part is truncated and drained.
async fn pump_file(
    field: &mut multer::Field<'static>,
    chunks: PartSender,
    limit: Option<u64>,
) -> Result<(), multer::Error> {
    let mut seen: u64 = 0;
    let mut forwarding = true;

    loop {
        let mut chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                if forwarding {
                    chunks.finish().await;
                }
                return Ok(());
            }
            Err(e) => {
                if forwarding {
                    let _ = chunks.send(Err(PartError::Stream(e.to_string()))).await;
                }
                return Err(e);
            }
        };

        if !forwarding {
            continue;
        }

        if let Some(max) = limit {
            let room = max.saturating_sub(seen);
            if chunk.len() as u64 > room {
                let head = chunk.split_to(room as usize);
                if !head.is_empty() && chunks.send(Ok(head)).await.is_err() {
                    forwarding = false;
                    continue;
                }
                let _ = chunks.send(Err(PartError::LimitExceeded { limit: max })).await;
                forwarding = false;
                continue;
            }
        }

        seen += chunk.len() as u64;
        if chunks.send(Ok(chunk)).await.is_err() {
            // The pipeline gave up on this file; keep reading so later parts are reachable.
            forwarding = false;
        }
    }
}
