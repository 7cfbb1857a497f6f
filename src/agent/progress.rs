use serde::Serialize;
use tokio::sync::mpsc;

use crate::tools::ToolKind;

/// Run progress, emitted as it happens so a front end can follow along
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    PlanGenerated {
        run_id: String,
        steps: Vec<String>,
    },
    StepStarted {
        run_id: String,
        index: usize,
        step: String,
    },
    ToolInvoked {
        run_id: String,
        tool: ToolKind,
        input: String,
        is_error: bool,
    },
    StepCompleted {
        run_id: String,
        index: usize,
        step: String,
        result: String,
    },
    PlanRevised {
        run_id: String,
        steps: Vec<String>,
    },
    FinalResponse {
        run_id: String,
        response: String,
    },
    Failed {
        run_id: String,
        error: String,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Forwards events to a channel. A dropped receiver is ignored.
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
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ProgressEvent::ToolInvoked {
            run_id: "r1".into(),
            tool: ToolKind::PriceChecker,
            input: "AAPL".into(),
            is_error: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "tool_invoked");
        assert_eq!(json["tool"], "price_checker");
        assert_eq!(json["run_id"], "r1");
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(ProgressEvent::Failed {
            run_id: "r".into(),
            error: "e".into(),
        });
        assert!(matches!(rx.recv().await, Some(ProgressEvent::Failed { .. })));

        drop(rx);
        sink.emit(ProgressEvent::Failed {
            run_id: "r".into(),
            error: "e".into(),
        });
    }
}
