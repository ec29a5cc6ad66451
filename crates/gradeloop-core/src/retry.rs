use std::time::Duration;

use gradeloop_types::{CallOutcome, GenerationOptions};

use crate::backend::{ChatBackend, ChatMessage};
use crate::clock::Sleeper;

/// Fixed delay before every attempt after the first, to avoid hammering a
/// possibly-overloaded backend.
pub const RETRY_DELAY: Duration = Duration::from_millis(2000);

const UNEXPECTED_FORMAT: &str = "Model call succeeded but returned unexpected format.";

/// Wraps a single model invocation with bounded retry. Never returns an
/// error: every failure mode is folded into the returned outcome, so callers
/// need no exception handling for this operation.
pub struct RetryingCaller<'a> {
    backend: &'a dyn ChatBackend,
    sleeper: &'a dyn Sleeper,
}

impl<'a> RetryingCaller<'a> {
    pub fn new(backend: &'a dyn ChatBackend, sleeper: &'a dyn Sleeper) -> Self {
        Self { backend, sleeper }
    }

    /// Attempt the call up to `max_retries + 1` times. An attempt counts as
    /// successful only when the backend result's content field is textual.
    pub async fn call(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        max_retries: u32,
    ) -> CallOutcome {
        for attempt in 0..=max_retries {
            if attempt > 0 {
                tracing::debug!(model, attempt = attempt + 1, "retrying model call");
                self.sleeper.sleep(RETRY_DELAY).await;
            }
            match self.backend.chat(model, messages, options).await {
                Ok(resp) => match resp.content.as_str() {
                    Some(text) => {
                        return CallOutcome::succeeded(text.to_string(), resp.usage, resp.duration);
                    }
                    None => {
                        tracing::warn!(
                            model,
                            attempt = attempt + 1,
                            "model returned non-textual content"
                        );
                        if attempt == max_retries {
                            return CallOutcome::failed(UNEXPECTED_FORMAT);
                        }
                    }
                },
                Err(err) => {
                    tracing::warn!(model, attempt = attempt + 1, error = %err, "model call failed");
                    if attempt == max_retries {
                        return CallOutcome::failed(err.to_string());
                    }
                }
            }
        }
        // Unreachable: the final iteration always returns.
        CallOutcome::failed("Exited retry loop unexpectedly")
    }
}
