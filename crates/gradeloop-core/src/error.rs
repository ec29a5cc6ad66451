use thiserror::Error;

/// Control conditions that unwind a run to its top-level handler.
#[derive(Debug, Error)]
pub enum RunError {
    /// The cancellation token was observed set at a suspension point.
    /// Not a retryable failure: it bypasses the retry layer entirely.
    #[error("Run cancelled by client.")]
    Cancelled,
}
