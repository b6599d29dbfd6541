//! Run Context - mutable state owned by exactly one run
//!
//! Workflows are shared, read-only templates. Everything that changes while
//! a run executes (state, previous content, counters) lives here and is
//! allocated per run.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use mm_core::{Content, Error, StepInput, StepOutput};

use crate::run::{RunFailure, RunOutcome, RunState, RunStatus};

/// Per-run execution context
pub struct RunContext {
    pub run_id: Uuid,
    pub workflow: String,
    state: RunState,
    workflow_input: Content,
    previous_content: Content,
    last_output: Option<StepOutput>,
    in_flight: bool,
    steps_executed: usize,
    started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(run_id: Uuid, workflow: &str, workflow_input: Content) -> Self {
        Self {
            run_id,
            workflow: workflow.to_string(),
            state: RunState::Pending,
            previous_content: workflow_input.clone(),
            workflow_input,
            last_output: None,
            in_flight: false,
            steps_executed: 0,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn workflow_input(&self) -> &Content {
        &self.workflow_input
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal run transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(run_id = %self.run_id, from = ?self.state, to = ?next, "Run state transition");
        self.state = next;
    }

    /// Enter step `index` and build its input
    pub fn begin_step(&mut self, index: usize) -> StepInput {
        self.transition(RunState::Running(index));
        self.in_flight = true;
        StepInput::new(self.previous_content.clone(), self.workflow_input.clone())
    }

    /// Fold a terminal output into the run. Returns the terminal state if the run ends here.
    pub fn complete_step(&mut self, output: StepOutput) -> Option<RunState> {
        self.steps_executed += 1;
        self.in_flight = false;
        let terminal = if output.stop {
            Some(if output.success {
                RunState::Stopped
            } else {
                RunState::Failed
            })
        } else {
            self.previous_content = output.content.clone();
            None
        };
        self.last_output = Some(output);
        if let Some(state) = terminal {
            self.transition(state);
        }
        terminal
    }

    /// Fail the run with a synthesized output. An in-flight step counts as executed.
    pub fn fail_step(&mut self) {
        if self.in_flight {
            self.steps_executed += 1;
            self.in_flight = false;
        }
        self.last_output = Some(StepOutput::failed(Content::Empty));
        self.transition(RunState::Failed);
    }

    /// All steps ran without a stop
    pub fn complete(&mut self) {
        self.transition(RunState::Completed);
    }

    /// Build the outcome for a terminal context
    pub fn into_outcome(self, error: Option<&Error>) -> RunOutcome {
        let status = self.state.status().unwrap_or(RunStatus::Failed);
        let output = match self.last_output {
            Some(output) => output,
            // empty workflow: the input passes through unchanged
            None => StepOutput::next(self.workflow_input),
        };
        RunOutcome {
            run_id: self.run_id,
            workflow: self.workflow,
            status,
            output,
            error: error.map(RunFailure::from),
            steps_executed: self.steps_executed,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}
