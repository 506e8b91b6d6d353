//! One file's pipeline: raw part bytes through the stage chain into a sink.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::StreamExt;
use sealpost_core::normalize_extension;
use sealpost_core::CipherStreamFactory;
use sealpost_processing::{SniffState, StageChain};
use sealpost_storage::{ByteSink, Destination, StorageError};
use tokio::sync::mpsc;

use crate::entry::FileEvent;
use crate::multipart::{FileStream, PartError};

/// Non-terminal state changes, reported while the pipeline runs.
pub type ReportSender = mpsc::UnboundedSender<(usize, FileEvent)>;

/// Per-request settings shared by every file pipeline.
#[derive(Clone)]
pub struct PipelineSettings {
    pub destination: Destination,
    /// Normalized allow-list. Presence enables sniffing.
    pub allowed: Option<Arc<[String]>>,
    pub cipher: Option<CipherStreamFactory>,
}

pub struct FilePipeline {
    pub index: usize,
    pub full_name: String,
    pub extension: String,
    pub encoding: String,
    pub settings: PipelineSettings,
    pub reports: ReportSender,
}

/// How a pipeline ended.
#[derive(Debug)]
pub enum PipelineExit {
    /// Terminal event for the file entry.
    Settled(FileEvent),
    /// The destination refused to open a sink. This rejects the whole request.
    SinkUnavailable(StorageError),
}

/// Why pumping stopped early.
enum Halt {
    File(String),
    SinkCreate(StorageError),
}

impl From<String> for Halt {
    fn from(error: String) -> Self {
        Halt::File(error)
    }
}

/// Where the processed bytes go while the sniff decision is pending.
enum Output {
    Held(Vec<Bytes>),
    Attached(Box<dyn ByteSink>),
}

impl FilePipeline {
    /// Run to completion and return how the file ended.
    pub async fn run(self, stream: FileStream) -> PipelineExit {
        let started = Instant::now();
        let mut size: u64 = 0;
        let mut output = Output::Held(Vec::new());

        match self.pump(stream, &mut size, &mut output).await {
            Ok(()) => PipelineExit::Settled(self.complete(output, size, started).await),
            Err(Halt::File(error)) => PipelineExit::Settled(self.fail(output, error, size).await),
            Err(Halt::SinkCreate(e)) => {
                tracing::warn!(
                    file_index = self.index,
                    name = %self.full_name,
                    error = %e,
                    "Failed to open sink"
                );
                PipelineExit::SinkUnavailable(e)
            }
        }
    }

    async fn pump(
        &self,
        mut stream: FileStream,
        size: &mut u64,
        output: &mut Output,
    ) -> Result<(), Halt> {
        let settings = &self.settings;
        let mut chain = StageChain::build(
            &self.encoding,
            settings.allowed.is_some(),
            settings.cipher.as_ref(),
        )
        .map_err(|e| format!("TRANSFORM ERROR {}", e))?;
        tracing::debug!(stages = ?chain.kinds(), "Pipeline planned");

        if chain.sniff_state().is_none() {
            self.attach(output).await?;
        }

        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(PartError::LimitExceeded { limit }) => {
                    return Err(format!("BYTES LIMIT EXCEEDED, limit {} bytes", limit).into());
                }
                Err(PartError::Stream(msg)) => {
                    return Err(format!("FILE STREAM ERROR {}", msg).into())
                }
            };

            *size += chunk.len() as u64;
            let processed = chain
                .push(chunk)
                .map_err(|e| format!("TRANSFORM ERROR {}", e))?;
            self.deliver(&chain, processed, output).await?;
        }

        let tail = chain
            .finish()
            .map_err(|e| format!("TRANSFORM ERROR {}", e))?;
        self.deliver(&chain, tail, output).await
    }

    /// Write processed bytes, or hold them until the sniff decision allows a sink.
    async fn deliver(&self, chain: &StageChain, data: Bytes, output: &mut Output) -> Result<(), Halt> {
        match output {
            Output::Attached(sink) => {
                if !data.is_empty() {
                    sink.write(data)
                        .await
                        .map_err(|e| format!("SINK ERROR {}", e))?;
                }
                Ok(())
            }
            Output::Held(held) => {
                if !data.is_empty() {
                    held.push(data);
                }
                match chain.sniff_state() {
                    Some(SniffState::Pending) => Ok(()),
                    state => {
                        self.check_allowed(state)?;
                        self.attach(output).await
                    }
                }
            }
        }
    }

    fn check_allowed(&self, state: Option<&SniffState>) -> Result<(), String> {
        let Some(allowed) = self.settings.allowed.as_deref() else {
            return Ok(());
        };
        let detected = state.and_then(SniffState::result);
        match detected {
            Some(found) if allowed.iter().any(|ext| *ext == found.extension) => Ok(()),
            Some(found) => Err(format!("EXTENSION NOT ALLOWED {}", found.extension)),
            None => Err(format!(
                "EXTENSION NOT ALLOWED {}",
                normalize_extension(&self.extension)
            )),
        }
    }

    /// Create the sink and flush whatever was held for it.
    async fn attach(&self, output: &mut Output) -> Result<(), Halt> {
        let mut sink = self
            .settings
            .destination
            .create_sink(&self.full_name)
            .await
            .map_err(Halt::SinkCreate)?;

        let held = match std::mem::replace(output, Output::Held(Vec::new())) {
            Output::Held(held) => held,
            attached @ Output::Attached(_) => {
                *output = attached;
                return Ok(());
            }
        };

        let _ = self.reports.send((self.index, FileEvent::Piping));

        for chunk in held {
            if let Err(e) = sink.write(chunk).await {
                *output = Output::Attached(sink);
                return Err(format!("SINK ERROR {}", e).into());
            }
        }
        *output = Output::Attached(sink);
        Ok(())
    }

    async fn complete(&self, output: Output, size: u64, started: Instant) -> FileEvent {
        let Output::Attached(sink) = output else {
            // Sniffing always decides by the end of input, so a sink exists here.
            return FileEvent::Fail {
                error: "SINK ERROR no sink attached".to_string(),
                size,
            };
        };

        match sink.finish().await {
            Ok(receipt) if self.settings.destination.requires_confirmation() && !receipt.confirmed => {
                self.remove_output().await;
                FileEvent::Fail {
                    error: "REMOTE SINK DID NOT CONFIRM".to_string(),
                    size,
                }
            }
            Ok(receipt) => {
                tracing::info!(
                    file_index = self.index,
                    name = %self.full_name,
                    size_bytes = size,
                    stored_bytes = receipt.bytes_written,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "File stored"
                );
                FileEvent::Finish { size }
            }
            Err(e) => {
                self.remove_output().await;
                FileEvent::Fail {
                    error: format!("SINK ERROR {}", e),
                    size,
                }
            }
        }
    }

    async fn fail(&self, output: Output, error: String, size: u64) -> FileEvent {
        tracing::info!(
            file_index = self.index,
            name = %self.full_name,
            size_bytes = size,
            error = %error,
            "File rejected"
        );

        if let Output::Attached(sink) = output {
            sink.abort().await;
            self.remove_output().await;
        }
        FileEvent::Fail { error, size }
    }

    async fn remove_output(&self) {
        if let Err(e) = self.settings.destination.delete_failed(&self.full_name).await {
            tracing::warn!(
                name = %self.full_name,
                error = %e,
                "Failed to delete partial output"
            );
        }
    }
}
