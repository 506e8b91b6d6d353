//! Content sniffing on the plaintext of a file.
//!
//! The sniffer only observes: every chunk is forwarded unchanged. Whether the sink
//! waits for the decision is up to the caller.

use std::future::Future;

use sealpost_core::file_extensions::{extension_for_mime, normalize_extension};
use tokio::sync::oneshot;

/// Prefix length the magic-byte heuristic needs to recognize every supported type.
pub const MINIMUM_BYTES: usize = 4100;

/// Chunks evaluated before giving up.
pub const EVALUATION_ROUNDS: usize = 2;

/// Detected type, with the canonical extension ("jpeg", never "jpg").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffResult {
    pub extension: String,
    pub mime: String,
}

impl SniffResult {
    fn from_kind(kind: infer::Type) -> Self {
        let extension = extension_for_mime(kind.mime_type())
            .map(str::to_string)
            .unwrap_or_else(|| normalize_extension(kind.extension()));
        SniffResult {
            extension,
            mime: kind.mime_type().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SniffState {
    Pending,
    Detected(SniffResult),
    NotFound,
}

impl SniffState {
    pub fn is_decided(&self) -> bool {
        !matches!(self, SniffState::Pending)
    }

    pub fn result(&self) -> Option<&SniffResult> {
        match self {
            SniffState::Detected(result) => Some(result),
            _ => None,
        }
    }
}

/// Sniff the type of a complete prefix in one go.
pub fn sniff(prefix: &[u8]) -> Option<SniffResult> {
    let end = prefix.len().min(MINIMUM_BYTES);
    infer::get(&prefix[..end]).map(SniffResult::from_kind)
}

#[derive(Debug)]
pub struct ContentSniffer {
    window: Vec<u8>,
    rounds: usize,
    state: SniffState,
    waiters: Vec<oneshot::Sender<Option<SniffResult>>>,
}

impl Default for ContentSniffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentSniffer {
    pub fn new() -> Self {
        ContentSniffer {
            window: Vec::with_capacity(MINIMUM_BYTES),
            rounds: 0,
            state: SniffState::Pending,
            waiters: Vec::new(),
        }
    }

    pub fn state(&self) -> &SniffState {
        &self.state
    }

    /// Resolves once with the detected type, or `None` when nothing matched.
    pub fn detect(&mut self) -> impl Future<Output = Option<SniffResult>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        match &self.state {
            SniffState::Pending => self.waiters.push(tx),
            decided => {
                let _ = tx.send(decided.result().cloned());
            }
        }
        async move { rx.await.ok().flatten() }
    }

    /// Observe the next chunk. Evaluation stops after the decision.
    pub fn observe(&mut self, chunk: &[u8]) {
        if self.state.is_decided() || chunk.is_empty() {
            return;
        }

        let room = MINIMUM_BYTES.saturating_sub(self.window.len());
        self.window
            .extend_from_slice(&chunk[..chunk.len().min(room)]);
        self.rounds += 1;

        if let Some(kind) = infer::get(&self.window) {
            self.decide(SniffState::Detected(SniffResult::from_kind(kind)));
        } else if self.rounds >= EVALUATION_ROUNDS {
            self.decide(SniffState::NotFound);
        }
    }

    /// Input ended before a decision was reached.
    pub fn end_of_input(&mut self) {
        if !self.state.is_decided() {
            self.decide(SniffState::NotFound);
        }
    }

    fn decide(&mut self, state: SniffState) {
        tracing::debug!(
            state = ?state,
            rounds = self.rounds,
            window_bytes = self.window.len(),
            "Content sniffing decided"
        );
        let result = state.result().cloned();
        self.state = state;
        self.window = Vec::new();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}
