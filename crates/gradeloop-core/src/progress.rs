use std::sync::Mutex;

use tokio::sync::mpsc;

use gradeloop_types::ProgressEvent;

/// One-way event channel from the orchestrator to the transport. Progress is
/// best-effort telemetry: implementations log delivery failures and swallow
/// them rather than propagating.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Encode one event as a `text/event-stream` frame (`data: <json>\n\n`).
pub fn sse_frame(event: &ProgressEvent) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}

/// Sink backed by an unbounded channel; the receiving half belongs to the
/// transport. A dropped receiver discards events, it does not fail the run.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::warn!("progress receiver dropped; event discarded");
        }
    }
}

/// Sink collecting events in memory. For tests and summaries.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: &ProgressEvent) {
        self.events.lock().expect("sink poisoned").push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frame_wraps_one_json_line() {
        let frame = sse_frame(&ProgressEvent::Log {
            message: "hello".to_string(),
        });
        assert_eq!(frame, "data: {\"type\":\"log\",\"message\":\"hello\"}\n\n");
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(&ProgressEvent::Log {
            message: "a".to_string(),
        });
        sink.emit(&ProgressEvent::Done {
            message: "b".to_string(),
        });
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::Log {
                message: "a".to_string()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::Done {
                message: "b".to_string()
            })
        );
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_panic() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(&ProgressEvent::Log {
            message: "late".to_string(),
        });
    }
}
