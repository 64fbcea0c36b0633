//! Per-call execution context

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Execution context handed to every provider callback.
///
/// Carries the cancellation signal raised when the host stops the provider.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
}

impl Context {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` unless the context is cancelled first. Returns `None` on cancellation.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}
