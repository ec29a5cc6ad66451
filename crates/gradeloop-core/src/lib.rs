//! gradeloop-core: orchestrator for looped two-model QA evaluations.
//! A work model answers each test case, a scoring model judges the answer
//! against a reference, and partial results are persisted after every case
//! while progress streams to an injected sink.

pub mod backend;
pub mod cancel;
pub mod clock;
pub mod error;
pub mod knowledge;
pub mod progress;
pub mod retry;
pub mod rubric;
pub mod runner;

pub use backend::{ChatBackend, ChatMessage, ChatResponse, OllamaBackend, Role};
pub use cancel::CancelToken;
pub use clock::{NoopSleeper, Sleeper, TokioSleeper};
pub use error::RunError;
pub use progress::{sse_frame, ChannelSink, MemorySink, ProgressSink};
pub use retry::RetryingCaller;
pub use runner::{OrchestratorBuilder, RunOrchestrator, RunStatus};
