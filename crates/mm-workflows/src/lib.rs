//! mm-workflows: sequential workflow engine with streaming steps
//!
//! Features:
//! - Steps backed by an agent or an executor, resolved to one execute contract
//! - Content events forwarded to the host as they arrive
//! - Stop/success rules deciding COMPLETED, STOPPED or FAILED
//! - Per-step timeouts and cancellation
//! - Many concurrent runs over one shared workflow definition

pub mod context;
pub mod engine;
pub mod flow;
pub mod run;
pub mod step;

pub use context::RunContext;
pub use engine::WorkflowEngine;
pub use flow::{StepInfo, Workflow, WorkflowBuilder, WorkflowInfo};
pub use run::{RunCompletion, RunEvent, RunFailure, RunHandle, RunOutcome, RunState, RunStatus};
pub use step::{
    async_executor_fn, executor_fn, AgentExecutor, EventStream, Step, StepBody, StepBuilder,
    StepExecutor,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::engine::WorkflowEngine;
    pub use super::flow::Workflow;
    pub use super::run::{RunEvent, RunHandle, RunOutcome, RunStatus};
    pub use super::step::{async_executor_fn, executor_fn, Step, StepExecutor};
    pub use mm_core::{Content, ContentEvent, Event, StepInput, StepOutput};
}
