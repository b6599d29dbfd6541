//! Workflow Engine - drives runs of step sequences
//!
//! The engine manages workflow execution:
//! - One spawned task per run, with its own `RunContext`
//! - Steps execute strictly in order; content events are forwarded as they arrive
//! - A step's terminal output decides whether the run continues, stops or fails
//! - Per-step timeouts and cooperative cancellation

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mm_core::{Content, EngineConfig, Error, Event, Result, StepInput, StepOutput};

use crate::context::RunContext;
use crate::flow::Workflow;
use crate::run::{RunEvent, RunHandle, RunOutcome};
use crate::step::Step;

/// Workflow Engine - executes workflows
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    step_timeout: Duration,
    event_buffer: usize,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl WorkflowEngine {
    /// Create a new workflow engine
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            step_timeout: config.step_timeout(),
            event_buffer: config.event_buffer.max(1),
        }
    }

    /// Default budget for steps without their own timeout
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Start a run. Must be called within a tokio runtime.
    ///
    /// Events are delivered through the returned handle; the last one is
    /// always `RunEvent::Finished`. Dropping the event receiver cancels the run.
    pub fn run(&self, workflow: Arc<Workflow>, input: impl Into<Content>) -> RunHandle {
        let run_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let cancel = CancellationToken::new();

        let driver = RunDriver {
            workflow: Arc::clone(&workflow),
            default_timeout: self.step_timeout,
            events: tx,
            cancel: cancel.clone(),
        };
        let ctx = RunContext::new(run_id, workflow.name(), input.into());
        let task = tokio::spawn(driver.drive(ctx));

        RunHandle::new(run_id, workflow.name().to_string(), rx, cancel, task)
    }

    /// Run to completion, discarding intermediate events
    pub async fn run_to_end(&self, workflow: Arc<Workflow>, input: impl Into<Content>) -> RunOutcome {
        self.run(workflow, input).wait().await
    }
}

/// Task-side state of one run
struct RunDriver {
    workflow: Arc<Workflow>,
    default_timeout: Duration,
    events: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
}

impl RunDriver {
    async fn drive(self, mut ctx: RunContext) -> RunOutcome {
        let run_id = ctx.run_id;
        info!(
            run_id = %run_id,
            workflow = %self.workflow.name(),
            steps = self.workflow.len(),
            "Starting workflow run"
        );

        let _ = self
            .events
            .send(RunEvent::Started {
                run_id,
                workflow: self.workflow.name().to_string(),
            })
            .await;

        let error = self.execute_steps(&mut ctx).await.err();
        let outcome = ctx.into_outcome(error.as_ref());

        match &error {
            None => info!(
                run_id = %run_id,
                workflow = %outcome.workflow,
                status = ?outcome.status,
                steps = outcome.steps_executed,
                "Workflow run finished"
            ),
            Some(e) => warn!(
                run_id = %run_id,
                workflow = %outcome.workflow,
                error = %e,
                "Workflow run failed"
            ),
        }

        // The receiver may be gone; the outcome is still returned through the task
        let _ = self.events.send(RunEvent::Finished(outcome.clone())).await;
        outcome
    }

    /// Run every step in order. Leaves `ctx` in a terminal state.
    async fn execute_steps(&self, ctx: &mut RunContext) -> Result<()> {
        for (index, step) in self.workflow.steps().iter().enumerate() {
            if self.cancel.is_cancelled() {
                return self.abort(ctx, Error::Cancelled);
            }

            let input = ctx.begin_step(index);
            debug!(run_id = %ctx.run_id, step = %step.name(), index, "Executing step");
            if !self
                .emit(RunEvent::StepStarted {
                    index,
                    step: step.name().to_string(),
                })
                .await
            {
                return self.abort(ctx, Error::Cancelled);
            }

            let timeout = step.timeout().unwrap_or(self.default_timeout);
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                _ = self.events.closed() => {
                    debug!(run_id = %ctx.run_id, step = %step.name(), "Event receiver dropped mid-step");
                    self.cancel.cancel();
                    Err(Error::Cancelled)
                }
                res = self.consume_step(index, step, input, timeout) => res,
            };

            let output = match result {
                Ok(output) => output,
                Err(e) => return self.abort(ctx, e),
            };

            debug!(
                run_id = %ctx.run_id,
                step = %step.name(),
                stop = output.stop,
                success = output.success,
                "Step completed"
            );
            // Best effort; a closed receiver is caught at the next send or the next step
            self.emit(RunEvent::StepCompleted {
                index,
                step: step.name().to_string(),
                output: output.clone(),
            })
            .await;

            if let Some(state) = ctx.complete_step(output) {
                info!(
                    run_id = %ctx.run_id,
                    step = %step.name(),
                    state = ?state,
                    "Step requested stop"
                );
                return Ok(());
            }
        }

        if self.cancel.is_cancelled() {
            return self.abort(ctx, Error::Cancelled);
        }
        ctx.complete();
        Ok(())
    }

    /// Consume one step's event stream up to its terminal output.
    ///
    /// Anything the step would emit after the terminal output is never polled.
    /// `budget` covers time spent waiting on the step, not on forwarding its events.
    async fn consume_step(
        &self,
        index: usize,
        step: &Step,
        input: StepInput,
        budget: Duration,
    ) -> Result<StepOutput> {
        let mut stream = step.execute(input);
        let mut remaining = budget;

        loop {
            let polled_at = Instant::now();
            let item = match tokio::time::timeout(remaining, stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    return Err(Error::StepTimeout {
                        step: step.name().to_string(),
                        timeout: budget,
                    })
                }
            };
            remaining = remaining.saturating_sub(polled_at.elapsed());

            match item {
                Ok(Event::Content(event)) => {
                    let forwarded = self
                        .emit(RunEvent::Content {
                            index,
                            step: step.name().to_string(),
                            event,
                        })
                        .await;
                    if !forwarded {
                        return Err(Error::Cancelled);
                    }
                }
                Ok(Event::Output(output)) => return Ok(output),
                Err(e @ Error::StepExecution { .. }) | Err(e @ Error::Cancelled) => return Err(e),
                Err(e) => return Err(Error::step_execution(step.name(), e.to_string())),
            }
        }

        Err(Error::malformed_step(
            step.name(),
            "event stream ended without a terminal output",
        ))
    }

    /// Send an event; false when the host has gone away
    async fn emit(&self, event: RunEvent) -> bool {
        if self.events.send(event).await.is_err() {
            debug!(workflow = %self.workflow.name(), "Event receiver dropped, cancelling run");
            self.cancel.cancel();
            return false;
        }
        true
    }

    fn abort(&self, ctx: &mut RunContext, error: Error) -> Result<()> {
        debug!(run_id = %ctx.run_id, state = ?ctx.state(), "Aborting run");
        ctx.fail_step();
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::async_executor_fn;

    #[tokio::test]
    async fn test_single_step_completes() {
        let step = Step::executor(
            "upper",
            async_executor_fn(|input: StepInput| async move {
                Ok(StepOutput::next(input.previous_step_content.to_text().to_uppercase()))
            }),
        )
        .unwrap();
        let wf = Arc::new(Workflow::new("wf", vec![step]).unwrap());

        let outcome = WorkflowEngine::default().run_to_end(wf, "abc").await;
        assert_eq!(outcome.content_text(), "ABC");
        assert_eq!(outcome.steps_executed, 1);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_error_is_wrapped_as_step_execution() {
        let step = Step::executor(
            "boom",
            async_executor_fn(|_input: StepInput| async move {
                Err::<StepOutput, _>(Error::agent("upstream unavailable"))
            }),
        )
        .unwrap();
        let wf = Arc::new(Workflow::new("wf", vec![step]).unwrap());

        let outcome = WorkflowEngine::default().run_to_end(wf, "x").await;
        let failure = outcome.error.unwrap();
        assert_eq!(failure.kind, "step_execution");
        assert!(failure.message.contains("upstream unavailable"));
        assert!(!outcome.output.success);
    }
}
