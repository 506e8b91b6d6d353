//! Drives one upload request: decoder events in, one pipeline task per file,
//! one aggregate result out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use sealpost_core::{CipherStreamFactory, Limits};
use sealpost_processing::StallTimeoutGuard;
use sealpost_storage::{Destination, StorageError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::entry::{FileEntry, FileEvent};
use crate::error::UploadError;
use crate::multipart::{
    DecoderEvent, DecoderEvents, DecoderLimits, FilePart, MultipartDecoder, RequestBody,
    CONTENT_TYPE_FIELD,
};
use crate::pipeline::{FilePipeline, PipelineExit, PipelineSettings, ReportSender};
use crate::result::{FormField, UploadResult};

/// Error recorded on files cut short by a request-level failure.
pub const UPLOAD_ABORTED: &str = "UPLOAD ABORTED";

type Joined = Result<(tokio::task::Id, (usize, PipelineExit)), tokio::task::JoinError>;

pub fn files_limit_warning(limit: usize) -> String {
    format!("MAX FILES REACHED, LIMIT IS {} FILES", limit)
}

/// Request-level error for a sink that could not be opened.
fn sink_rejection(err: StorageError) -> UploadError {
    tracing::error!(error = %err, "Sink creation failed, rejecting upload");
    match err {
        StorageError::IoError(io) => UploadError::Io(io),
        other => UploadError::Storage(other),
    }
}

/// Everything the orchestrator tracks for one request. Only the orchestrator
/// loop mutates it; pipelines report through channels.
#[derive(Debug, Default)]
struct RequestState {
    entries: Vec<FileEntry>,
    fields: Vec<FormField>,
    warnings: Vec<String>,
    errors: Vec<String>,
    /// Registered files not yet terminal.
    pending: usize,
    resolved: bool,
}

impl RequestState {
    fn register(&mut self, entry: FileEntry) {
        self.pending += 1;
        self.entries.push(entry);
    }

    fn apply(&mut self, index: usize, event: FileEvent) {
        let Some(entry) = self.entries.get_mut(index) else {
            return;
        };
        if entry.transition(event) {
            self.pending -= 1;
        }
    }

    fn join_satisfied(&self, decoder_finished: bool) -> bool {
        decoder_finished && self.pending == 0
    }

    /// Produce the result once. Later calls, and calls before the join holds, return `None`.
    fn try_resolve(
        &mut self,
        decoder_finished: bool,
        destination: &Destination,
    ) -> Option<UploadResult> {
        if self.resolved || !self.join_satisfied(decoder_finished) {
            return None;
        }
        Some(self.resolve(destination))
    }

    /// Resolve regardless of the join condition, still at most once.
    fn force_resolve(&mut self, destination: &Destination) -> Option<UploadResult> {
        if self.resolved {
            return None;
        }
        Some(self.resolve(destination))
    }

    fn resolve(&mut self, destination: &Destination) -> UploadResult {
        self.resolved = true;
        UploadResult::assemble(
            std::mem::take(&mut self.warnings),
            std::mem::take(&mut self.errors),
            self.entries.iter().map(|entry| entry.to_json(destination)),
            std::mem::take(&mut self.fields),
        )
    }
}

/// Owns one request from the first body byte to the aggregate result.
pub struct UploadPipelineOrchestrator {
    destination: Destination,
    limits: Limits,
    allowed: Option<Arc<[String]>>,
    cipher: Option<CipherStreamFactory>,
    timeout: Duration,
    span: tracing::Span,
}

impl UploadPipelineOrchestrator {
    pub fn new(
        destination: Destination,
        limits: Limits,
        cipher: Option<CipherStreamFactory>,
        timeout: Duration,
    ) -> Self {
        let allowed = limits.normalized_allowed().map(Arc::from);
        UploadPipelineOrchestrator {
            destination,
            limits,
            allowed,
            cipher,
            timeout,
            span: tracing::Span::current(),
        }
    }

    /// Scope every log line of this request, including the per-file tasks, under `span`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub async fn process<D>(self, body: RequestBody, decoder: D) -> Result<UploadResult, UploadError>
    where
        D: MultipartDecoder,
    {
        let span = self.span.clone();
        self.run(body, decoder).instrument(span).await
    }

    async fn run<D>(self, body: RequestBody, decoder: D) -> Result<UploadResult, UploadError>
    where
        D: MultipartDecoder,
    {
        let started = Instant::now();

        self.destination
            .ensure_writable()
            .await
            .map_err(|e| UploadError::Config(e.to_string()))?;

        let guard = StallTimeoutGuard::new(self.timeout);
        let (stall_tx, mut stall_rx) = oneshot::channel();
        guard.arm(move |outcome| {
            if let Some(stall) = outcome {
                let _ = stall_tx.send(stall);
            }
        });
        let body: RequestBody = guard.watch(body).boxed();

        let mut events = decoder.start(
            body,
            DecoderLimits {
                file_size: self.limits.file_size,
                files: self.limits.files,
            },
        );

        let settings = PipelineSettings {
            destination: self.destination.clone(),
            allowed: self.allowed.clone(),
            cipher: self.cipher.clone(),
        };
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let mut tasks: JoinSet<(usize, PipelineExit)> = JoinSet::new();
        let mut task_files: HashMap<tokio::task::Id, usize> = HashMap::new();

        let mut state = RequestState::default();
        let mut decoder_finished = false;
        let mut stall_settled = false;

        loop {
            if let Some(result) = state.try_resolve(decoder_finished, &self.destination) {
                guard.disarm();
                self.log_resolved(&result, started);
                return Ok(result);
            }

            tokio::select! {
                biased;

                stall = &mut stall_rx, if !stall_settled => match stall {
                    Ok(stall) => {
                        tracing::warn!(
                            window_ms = stall.window.as_millis() as u64,
                            files = state.entries.len(),
                            "Upload stalled, discarding every stored file"
                        );
                        self.discard_request(&state, &mut events, &mut tasks).await;
                        return Err(UploadError::Timeout(stall));
                    }
                    // The guard was disarmed at the end of the body.
                    Err(_) => stall_settled = true,
                },

                event = events.next(), if !decoder_finished => match event {
                    None => {
                        tracing::debug!(files = state.entries.len(), "Body fully parsed");
                        decoder_finished = true;
                    }
                    Some(DecoderEvent::Field { name, value }) => {
                        if name == CONTENT_TYPE_FIELD {
                            continue;
                        }
                        tracing::debug!(field = %name, "Form field received");
                        state.fields.push(FormField { name, value });
                    }
                    Some(DecoderEvent::File(part)) => {
                        let (id, index) = self.spawn_file(part, &settings, &report_tx, &mut tasks, &mut state);
                        task_files.insert(id, index);
                    }
                    Some(DecoderEvent::FilesLimit) => {
                        let limit = self.limits.files.unwrap_or_default();
                        tracing::warn!(limit, "File count limit reached");
                        state.warnings.push(files_limit_warning(limit));
                    }
                    Some(DecoderEvent::Error(message)) => {
                        let result = self
                            .abort_request(&mut state, &mut events, &mut tasks, &mut task_files, message)
                            .await;
                        guard.disarm();
                        match result {
                            Ok(Some(result)) => {
                                self.log_resolved(&result, started);
                                return Ok(result);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                self.discard_request(&state, &mut events, &mut tasks).await;
                                return Err(sink_rejection(e));
                            }
                        }
                    }
                },

                Some((index, event)) = report_rx.recv() => state.apply(index, event),

                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    if let Err(e) = self.settle_joined(joined, &mut state, &mut task_files).await {
                        guard.disarm();
                        self.discard_request(&state, &mut events, &mut tasks).await;
                        return Err(sink_rejection(e));
                    }
                }
            }
        }
    }

    /// Register a file entry and start its pipeline. Returns the task id and entry index.
    fn spawn_file(
        &self,
        part: FilePart,
        settings: &PipelineSettings,
        reports: &ReportSender,
        tasks: &mut JoinSet<(usize, PipelineExit)>,
        state: &mut RequestState,
    ) -> (tokio::task::Id, usize) {
        let FilePart {
            field_name,
            file_name,
            encoding,
            mime_type,
            stream,
        } = part;

        let index = state.entries.len();
        let entry = FileEntry::new(
            index,
            field_name,
            file_name,
            encoding,
            mime_type,
            self.cipher.is_some(),
        );

        let span = tracing::info_span!(
            "file",
            file_index = index,
            field = %entry.field_name,
            new_name = %entry.new_name
        );
        span.in_scope(|| {
            tracing::debug!(
                filename = %entry.original_filename,
                encoding = %entry.encoding,
                "File received"
            )
        });

        let pipeline = FilePipeline {
            index,
            full_name: entry.full_name(),
            extension: entry.extension.clone(),
            encoding: entry.encoding.clone(),
            settings: settings.clone(),
            reports: reports.clone(),
        };
        state.register(entry);

        let handle = tasks.spawn(async move { (index, pipeline.run(stream).await) }.instrument(span));
        (handle.id(), index)
    }

    /// Apply the terminal event of a finished pipeline task. A crashed task fails its file.
    ///
    /// A pipeline that could not open its sink is returned as an error: the request is rejected.
    async fn settle_joined(
        &self,
        joined: Joined,
        state: &mut RequestState,
        task_files: &mut HashMap<tokio::task::Id, usize>,
    ) -> Result<(), StorageError> {
        match joined {
            Ok((id, (index, exit))) => {
                task_files.remove(&id);
                match exit {
                    PipelineExit::Settled(event) => state.apply(index, event),
                    PipelineExit::SinkUnavailable(e) => return Err(e),
                }
            }
            Err(e) => {
                let Some(index) = task_files.remove(&e.id()) else {
                    return Ok(());
                };
                tracing::error!(file_index = index, error = %e, "File pipeline crashed");
                let Some(entry) = state.entries.get(index) else {
                    return Ok(());
                };
                let size = entry.size_bytes;
                self.remove_output(&entry.full_name()).await;
                state.apply(
                    index,
                    FileEvent::Fail {
                        error: UPLOAD_ABORTED.to_string(),
                        size,
                    },
                );
            }
        }
        Ok(())
    }

    /// Early resolution after the decoder failed, without waiting for the end of the body.
    ///
    /// Stopping the decoder closes every open file stream, so files still receiving data
    /// fail and remove their own output while completed ones are kept.
    async fn abort_request(
        &self,
        state: &mut RequestState,
        events: &mut DecoderEvents,
        tasks: &mut JoinSet<(usize, PipelineExit)>,
        task_files: &mut HashMap<tokio::task::Id, usize>,
        message: String,
    ) -> Result<Option<UploadResult>, StorageError> {
        tracing::warn!(error = %message, "Multipart decoding failed, aborting upload");
        events.abort();
        while let Some(joined) = tasks.join_next_with_id().await {
            self.settle_joined(joined, state, task_files).await?;
        }

        state.errors.push(message);
        Ok(state.force_resolve(&self.destination))
    }

    /// Stop the decoder and every pipeline, then delete everything the request stored.
    async fn discard_request(
        &self,
        state: &RequestState,
        events: &mut DecoderEvents,
        tasks: &mut JoinSet<(usize, PipelineExit)>,
    ) {
        events.abort();
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        for entry in &state.entries {
            self.remove_output(&entry.full_name()).await;
        }
    }

    async fn remove_output(&self, full_name: &str) {
        if let Err(e) = self.destination.delete_failed(full_name).await {
            tracing::warn!(name = %full_name, error = %e, "Failed to delete partial output");
        }
    }

    fn log_resolved(&self, result: &UploadResult, started: Instant) {
        tracing::info!(
            files = result.files.len(),
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            fields = result.fields.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Upload resolved"
        );
    }
}
