//! Demo plugin - chatter agent plus `simple_workflow`
//!
//! `simple_workflow` has two steps. `random_step` flips a coin: half the time
//! it streams a progress note and stops the run with a fixed answer,
//! otherwise it hands the input on to the `chatter` agent.

use futures::stream;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};

use mm_core::{Agent, Event, Result, StepInput, StepOutput};
use mm_plugins::{EchoAgent, EchoConfig, FactoryContext, Plugin, PluginRegistry};
use mm_workflows::{executor_fn, Step, StepExecutor, Workflow};

pub const CHATTER_AGENT: &str = "chatter";
pub const SIMPLE_WORKFLOW: &str = "simple_workflow";

pub const THINKING_NOTE: &str = "Thinking, please wait...";
pub const FIXED_ANSWER: &str = "This is a fixed answer";

/// Coin-flip step: stop with a fixed answer or pass the previous content on
pub fn random_step(rng: Arc<Mutex<StdRng>>) -> Arc<dyn StepExecutor> {
    executor_fn(move |input: StepInput| {
        let stop = rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_bool(0.5);
        let events: Vec<Result<Event>> = if stop {
            vec![
                Ok(Event::content(THINKING_NOTE)),
                Ok(Event::Output(StepOutput::finish(FIXED_ANSWER))),
            ]
        } else {
            vec![Ok(Event::Output(StepOutput::next(
                input.previous_step_content,
            )))]
        };
        stream::iter(events)
    })
}

/// Plugin contributing the `chatter` agent and `simple_workflow`
pub struct DemoPlugin {
    rng: Arc<Mutex<StdRng>>,
}

impl DemoPlugin {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic coin flips
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Arc::new(Mutex::new(rng)),
        }
    }
}

impl Default for DemoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DemoPlugin {
    fn name(&self) -> &str {
        "demo"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Chatter agent and the simple_workflow demo"
    }

    fn register(&self, registry: &PluginRegistry) -> Result<()> {
        registry.register_agent_factory(
            CHATTER_AGENT,
            |ctx: &FactoryContext<'_>, config: &EchoConfig| -> Result<Arc<dyn Agent>> {
                Ok(Arc::new(EchoAgent::new(ctx.name(), config)))
            },
            EchoConfig::default(),
        )?;

        let rng = Arc::clone(&self.rng);
        registry.register_workflow_factory(SIMPLE_WORKFLOW, move |ctx| {
            let chatter = ctx.agent(CHATTER_AGENT)?;
            Workflow::builder(ctx.name())
                .description("Random early answer, otherwise chat")
                .step(
                    Step::executor("random_step", random_step(Arc::clone(&rng)))?
                        .with_description("Random step"),
                )
                .step(Step::agent("chatter", chatter)?.with_description("Chat"))
                .build()
        })
    }
}
