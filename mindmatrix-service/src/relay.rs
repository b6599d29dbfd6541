//! Relay - turns run events into transport frames
//!
//! Frames follow the server-sent-events shape a web layer would emit:
//! `stream` deltas while steps run, `artifact` payloads, and a final `done`.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use mm_core::{Artifact, ContentEvent};
use mm_workflows::{RunEvent, RunFailure, RunHandle, RunOutcome, RunStatus};

/// Frame delivered to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HostFrame {
    /// Partial text
    Stream { delta: String },
    /// Structured side output
    Artifact(Artifact),
    /// Run finished
    Done {
        status: RunStatus,
        content: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<RunFailure>,
    },
}

impl HostFrame {
    /// Frames for one content event: its artifacts when it carries any,
    /// otherwise its text as a delta
    pub fn from_content(event: ContentEvent) -> Vec<HostFrame> {
        if event.artifacts.is_empty() {
            vec![HostFrame::Stream {
                delta: event.content.to_text(),
            }]
        } else {
            event.artifacts.into_iter().map(HostFrame::Artifact).collect()
        }
    }

    pub fn done(outcome: &RunOutcome) -> Self {
        HostFrame::Done {
            status: outcome.status,
            content: serde_json::to_value(outcome.content()).unwrap_or(Value::Null),
            error: outcome.error.clone(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            HostFrame::Stream { .. } => "stream",
            HostFrame::Artifact(_) => "artifact",
            HostFrame::Done { .. } => "done",
        }
    }

    /// JSON payload of the frame
    pub fn data(&self) -> Value {
        match self {
            HostFrame::Stream { delta } => serde_json::json!({ "delta": delta }),
            HostFrame::Artifact(artifact) => {
                serde_json::to_value(artifact).unwrap_or(Value::Null)
            }
            HostFrame::Done {
                status,
                content,
                error,
            } => serde_json::json!({
                "status": status,
                "content": content,
                "error": error,
            }),
        }
    }

    /// Server-sent-events encoding
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_name(), self.data())
    }
}

/// Forward a run's events to `sink` until the run finishes.
///
/// If the sink closes (client went away) the run is cancelled and the
/// remaining events are discarded. Returns the run outcome.
pub async fn relay(mut handle: RunHandle, sink: mpsc::Sender<HostFrame>) -> RunOutcome {
    let run_id = handle.run_id();

    loop {
        let event = tokio::select! {
            biased;
            _ = sink.closed() => {
                warn!(run_id = %run_id, "Client disconnected, cancelling run");
                handle.cancel();
                return handle.wait().await;
            }
            event = handle.next_event() => event,
        };
        let Some(event) = event else { break };

        let frames = match event {
            RunEvent::Content { event, .. } => HostFrame::from_content(event),
            RunEvent::Finished(outcome) => {
                let _ = sink.send(HostFrame::done(&outcome)).await;
                return outcome;
            }
            other => {
                debug!(run_id = %run_id, event = ?other, "Run progress");
                continue;
            }
        };

        for frame in frames {
            if sink.send(frame).await.is_err() {
                warn!(run_id = %run_id, "Client disconnected, cancelling run");
                handle.cancel();
                return handle.wait().await;
            }
        }
    }

    // channel closed without Finished: the task itself ended abnormally
    handle.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::Content;

    #[test]
    fn test_content_without_artifacts_is_delta() {
        let frames = HostFrame::from_content(ContentEvent::new("hel"));
        assert_eq!(
            frames,
            vec![HostFrame::Stream {
                delta: "hel".to_string()
            }]
        );
    }

    #[test]
    fn test_artifacts_become_artifact_frames() {
        let event = ContentEvent::new(Content::Empty)
            .with_artifact(Artifact::new("chart", serde_json::json!({"x": [1, 2]})))
            .with_artifact(Artifact::new("table", serde_json::json!([])));
        let frames = HostFrame::from_content(event);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event_name(), "artifact");
        assert_eq!(frames[0].data()["type"], "chart");
    }

    #[test]
    fn test_sse_encoding() {
        let frame = HostFrame::Stream {
            delta: "hi".to_string(),
        };
        assert_eq!(frame.to_sse(), "event: stream\ndata: {\"delta\":\"hi\"}\n\n");
    }
}
