//! Stall detection for the inbound request body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{future, stream, Stream, StreamExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Raised when no chunk arrived within the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("REQUEST TIMEOUT")]
pub struct StallError {
    pub window: Duration,
}

type Callback = Box<dyn FnOnce(Option<StallError>) + Send>;

struct GuardInner {
    activity: Notify,
    callback: Mutex<Option<Callback>>,
    settled: AtomicBool,
    cancel: CancellationToken,
}

impl GuardInner {
    /// Runs the callback at most once, whatever the outcome.
    fn settle(&self, outcome: Option<StallError>) {
        if self.settled.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = match self.callback.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

/// Resets a timer on every observed chunk and signals once if the timer elapses.
///
/// A zero window disables the timer; `disarm` still reports `None` to the callback.
#[derive(Clone)]
pub struct StallTimeoutGuard {
    window: Duration,
    inner: Arc<GuardInner>,
}

impl StallTimeoutGuard {
    pub fn new(window: Duration) -> Self {
        StallTimeoutGuard {
            window,
            inner: Arc::new(GuardInner {
                activity: Notify::new(),
                callback: Mutex::new(None),
                settled: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.window.is_zero()
    }

    /// Register the callback and start the timer. Must run inside a tokio runtime.
    pub fn arm<F>(&self, on_settle: F)
    where
        F: FnOnce(Option<StallError>) + Send + 'static,
    {
        match self.inner.callback.lock() {
            Ok(mut slot) => *slot = Some(Box::new(on_settle)),
            Err(poisoned) => *poisoned.into_inner() = Some(Box::new(on_settle)),
        }

        if !self.is_enabled() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let window = self.window;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inner.cancel.cancelled() => return,
                    waited = tokio::time::timeout(window, inner.activity.notified()) => {
                        if waited.is_err() {
                            tracing::warn!(window_ms = window.as_millis() as u64, "Request body stalled");
                            inner.settle(Some(StallError { window }));
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Record activity, resetting the timer.
    pub fn touch(&self) {
        self.inner.activity.notify_one();
    }

    /// Stop the timer and settle with "no error" unless the timeout already fired.
    pub fn disarm(&self) {
        self.inner.cancel.cancel();
        self.inner.settle(None);
    }

    pub fn is_settled(&self) -> bool {
        self.inner.settled.load(Ordering::SeqCst)
    }

    /// Pass-through adapter: every item touches the guard, end of stream disarms it.
    pub fn watch<S>(&self, source: S) -> impl Stream<Item = S::Item> + Send + 'static
    where
        S: Stream + Send + 'static,
        S::Item: Send + 'static,
    {
        let on_item = self.clone();
        let on_end = self.clone();
        source
            .inspect(move |_| on_item.touch())
            .chain(
                stream::once(async move {
                    on_end.disarm();
                    None
                })
                .filter_map(future::ready),
            )
    }
}
