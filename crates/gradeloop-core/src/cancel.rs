use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RunError;

/// Cooperative, poll-based cancellation signal. Cloned handles share one
/// flag; the orchestrator polls it at every suspension point: loop entry,
/// immediately before each model invocation, and on every progress-event
/// emission, so a flag set mid-call is observed before anything further is
/// streamed or persisted. A set flag is observed before the retry layer is
/// entered, never inside it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Raise the distinguished cancellation condition if the flag is set.
    pub fn check(&self) -> Result<(), RunError> {
        if self.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}
