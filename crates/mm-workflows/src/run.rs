//! Run handle, run events and outcomes
//!
//! A run is observed through `RunHandle`: events arrive on a bounded channel
//! in emission order and `RunEvent::Finished` is always the last one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mm_core::{Content, ContentEvent, Error, StepOutput};

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Last step finished without requesting a stop
    Completed,
    /// A step requested a stop and reported success
    Stopped,
    /// A step requested a stop without success, or the run failed
    Failed,
}

/// Position in the run state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum RunState {
    Pending,
    Running(usize),
    Stopped,
    Failed,
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Stopped | RunState::Failed | RunState::Completed)
    }

    /// Status for a terminal state
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            RunState::Completed => Some(RunStatus::Completed),
            RunState::Stopped => Some(RunStatus::Stopped),
            RunState::Failed => Some(RunStatus::Failed),
            RunState::Pending | RunState::Running(_) => None,
        }
    }

    /// Whether `next` is a legal successor
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match (self, next) {
            (RunState::Pending, RunState::Running(0)) => true,
            (RunState::Pending, RunState::Completed | RunState::Failed) => true,
            (RunState::Running(i), RunState::Running(j)) => j == i + 1,
            (RunState::Running(_), s) => s.is_terminal(),
            _ => false,
        }
    }
}

/// Error that ended a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for RunFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Terminal result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub workflow: String,
    pub status: RunStatus,
    /// Last step output; synthesized with `success = false` when a step never produced one
    pub output: StepOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    pub steps_executed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn content(&self) -> &Content {
        &self.output.content
    }

    pub fn content_text(&self) -> String {
        self.output.content.to_text()
    }

    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }
}

/// Progress forwarded to the host while a run executes
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: Uuid,
        workflow: String,
    },
    StepStarted {
        index: usize,
        step: String,
    },
    Content {
        index: usize,
        step: String,
        event: ContentEvent,
    },
    StepCompleted {
        index: usize,
        step: String,
        output: StepOutput,
    },
    Finished(RunOutcome),
}

impl RunEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunEvent::Finished(_))
    }
}

/// Host-side handle of one run
pub struct RunHandle {
    run_id: Uuid,
    workflow: String,
    events: mpsc::Receiver<RunEvent>,
    cancel: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub(crate) fn new(
        run_id: Uuid,
        workflow: String,
        events: mpsc::Receiver<RunEvent>,
        cancel: CancellationToken,
        task: JoinHandle<RunOutcome>,
    ) -> Self {
        Self {
            run_id,
            workflow,
            events,
            cancel,
            task,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    /// Next event, or None once the run has finished and the channel drained
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Cancel the run. The in-flight step is dropped and the run ends `Failed`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Split into an event stream and a completion handle.
    ///
    /// Dropping the stream before `Finished` cancels the run.
    pub fn into_parts(self) -> (ReceiverStream<RunEvent>, RunCompletion) {
        (
            ReceiverStream::new(self.events),
            RunCompletion {
                run_id: self.run_id,
                workflow: self.workflow,
                cancel: self.cancel,
                task: self.task,
            },
        )
    }

    /// Drain all events and wait for the outcome (batch mode)
    pub async fn collect(mut self) -> (Vec<RunEvent>, RunOutcome) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let completion = RunCompletion {
            run_id: self.run_id,
            workflow: self.workflow,
            cancel: self.cancel,
            task: self.task,
        };
        (events, completion.wait().await)
    }

    /// Discard events and wait for the outcome
    pub async fn wait(self) -> RunOutcome {
        self.collect().await.1
    }
}

/// Completion half of a run handle
pub struct RunCompletion {
    run_id: Uuid,
    workflow: String,
    cancel: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

impl RunCompletion {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the outcome. A run task that panicked is reported as `Failed`.
    pub async fn wait(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(run_id = %self.run_id, error = %e, "Run task aborted");
                let now = Utc::now();
                RunOutcome {
                    run_id: self.run_id,
                    workflow: self.workflow,
                    status: RunStatus::Failed,
                    output: StepOutput::failed(Content::Empty),
                    error: Some(RunFailure::from(&Error::internal(e.to_string()))),
                    steps_executed: 0,
                    started_at: now,
                    finished_at: now,
                }
            }
        }
    }
}
