//! Workflow Step - an agent or a function behind one execute contract
//!
//! A step is declared with exactly one body: an agent reference or an
//! executor. At construction the body is resolved into a single
//! `StepExecutor`, so the engine never inspects the body kind while running.

use async_stream::try_stream;
use futures::stream::{self, Stream};
use futures::Future;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use mm_core::{
    Agent, AgentEvent, AgentRequest, Content, Error, Event, Result, StepInput, StepOutput,
};

/// Event sequence produced by one step invocation.
///
/// The engine drops the stream as soon as it has the terminal output, on
/// timeout, and on cancellation. Producers must release their resources on drop.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// Uniform step contract
pub trait StepExecutor: Send + Sync {
    fn execute(&self, input: StepInput) -> EventStream;
}

/// Executor backed by a closure returning an event stream
pub struct FnExecutor<F> {
    f: F,
}

impl<F, S> StepExecutor for FnExecutor<F>
where
    F: Fn(StepInput) -> S + Send + Sync,
    S: Stream<Item = Result<Event>> + Send + 'static,
{
    fn execute(&self, input: StepInput) -> EventStream {
        Box::pin((self.f)(input))
    }
}

/// Executor backed by an async closure that only produces the terminal output
pub struct AsyncFnExecutor<F> {
    f: F,
}

impl<F, Fut> StepExecutor for AsyncFnExecutor<F>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput>> + Send + 'static,
{
    fn execute(&self, input: StepInput) -> EventStream {
        let fut = (self.f)(input);
        Box::pin(stream::once(async move { fut.await.map(Event::Output) }))
    }
}

/// Wrap a stream-producing closure as an executor
pub fn executor_fn<F, S>(f: F) -> Arc<dyn StepExecutor>
where
    F: Fn(StepInput) -> S + Send + Sync + 'static,
    S: Stream<Item = Result<Event>> + Send + 'static,
{
    Arc::new(FnExecutor { f })
}

/// Wrap an async closure as an executor
pub fn async_executor_fn<F, Fut>(f: F) -> Arc<dyn StepExecutor>
where
    F: Fn(StepInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput>> + Send + 'static,
{
    Arc::new(AsyncFnExecutor { f })
}

/// Adapts an agent's response stream into step events.
///
/// The previous step's content is the prompt. Partial content is forwarded
/// as it arrives; the final response becomes a continuing `StepOutput`. An
/// agent that closes its stream without a response yields `success = false`.
pub struct AgentExecutor {
    agent: Arc<dyn Agent>,
}

impl AgentExecutor {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

impl StepExecutor for AgentExecutor {
    fn execute(&self, input: StepInput) -> EventStream {
        let agent = Arc::clone(&self.agent);
        Box::pin(try_stream! {
            let request = AgentRequest::new(input.previous_step_content)
                .with_workflow_input(input.workflow_input);
            let mut rx = agent.complete(request).await?;

            let mut response = None;
            while let Some(item) = rx.recv().await {
                match item? {
                    AgentEvent::Content(event) => {
                        yield Event::Content(event);
                    }
                    AgentEvent::Response(r) => {
                        response = Some(r);
                        break;
                    }
                }
            }

            match response {
                Some(r) => {
                    yield Event::Output(StepOutput::next(r.content));
                }
                None => {
                    tracing::warn!(agent = %agent.name(), "Agent finished without a response");
                    yield Event::Output(StepOutput::next(Content::Empty).with_success(false));
                }
            }
        })
    }
}

/// Declared body of a step
#[derive(Clone)]
pub enum StepBody {
    Agent(Arc<dyn Agent>),
    Executor(Arc<dyn StepExecutor>),
}

impl StepBody {
    /// Resolve into the uniform execute contract
    fn resolve(self) -> Arc<dyn StepExecutor> {
        match self {
            StepBody::Agent(agent) => Arc::new(AgentExecutor::new(agent)),
            StepBody::Executor(executor) => executor,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            StepBody::Agent(_) => "agent",
            StepBody::Executor(_) => "executor",
        }
    }
}

/// A named unit of work within a workflow
#[derive(Clone)]
pub struct Step {
    name: String,
    description: String,
    kind: &'static str,
    executor: Arc<dyn StepExecutor>,
    timeout: Option<Duration>,
}

impl Step {
    /// Create a step; the body is resolved here, once
    pub fn new(name: impl Into<String>, body: StepBody) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::malformed_step(name, "step name must not be empty"));
        }
        Ok(Self {
            name,
            description: String::new(),
            kind: body.kind(),
            executor: body.resolve(),
            timeout: None,
        })
    }

    /// Step backed by an agent
    pub fn agent(name: impl Into<String>, agent: Arc<dyn Agent>) -> Result<Self> {
        Self::new(name, StepBody::Agent(agent))
    }

    /// Step backed by an executor
    pub fn executor(name: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Result<Self> {
        Self::new(name, StepBody::Executor(executor))
    }

    /// Declarative builder for when agent/executor are optional inputs
    pub fn builder(name: impl Into<String>) -> StepBuilder {
        StepBuilder {
            name: name.into(),
            description: String::new(),
            agent: None,
            executor: None,
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Override the engine's default step timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// "agent" or "executor"
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn execute(&self, input: StepInput) -> EventStream {
        self.executor.execute(input)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder mirroring a step declaration with optional `agent` / `executor`
pub struct StepBuilder {
    name: String,
    description: String,
    agent: Option<Arc<dyn Agent>>,
    executor: Option<Arc<dyn StepExecutor>>,
    timeout: Option<Duration>,
}

impl StepBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fails with `MalformedStep` unless exactly one body was given
    pub fn build(self) -> Result<Step> {
        let body = match (self.agent, self.executor) {
            (Some(agent), None) => StepBody::Agent(agent),
            (None, Some(executor)) => StepBody::Executor(executor),
            (None, None) => {
                return Err(Error::malformed_step(
                    self.name,
                    "declares neither agent nor executor",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(Error::malformed_step(
                    self.name,
                    "declares both agent and executor",
                ))
            }
        };

        let mut step = Step::new(self.name, body)?.with_description(self.description);
        step.timeout = self.timeout;
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use mm_core::{AgentResponse, AgentStream, ContentEvent};

    struct ScriptedAgent {
        chunks: Vec<&'static str>,
        respond: bool,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: AgentRequest) -> Result<AgentStream> {
            let (tx, rx) = tokio::sync::mpsc::channel(8);
            let chunks = self.chunks.clone();
            let respond = self.respond;
            tokio::spawn(async move {
                for chunk in chunks {
                    let _ = tx
                        .send(Ok(AgentEvent::Content(ContentEvent::new(chunk))))
                        .await;
                }
                if respond {
                    let reply = format!("reply to {}", request.prompt);
                    let _ = tx
                        .send(Ok(AgentEvent::Response(AgentResponse::new(reply))))
                        .await;
                }
            });
            Ok(rx)
        }
    }

    #[test]
    fn test_builder_requires_exactly_one_body() {
        let err = Step::builder("empty").build().unwrap_err();
        assert!(matches!(err, Error::MalformedStep { .. }));

        let agent: Arc<dyn Agent> = Arc::new(ScriptedAgent {
            chunks: vec![],
            respond: true,
        });
        let exec = async_executor_fn(|input: StepInput| async move {
            Ok(StepOutput::next(input.previous_step_content))
        });
        let err = Step::builder("both")
            .agent(agent)
            .executor(exec)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MalformedStep { .. }));
    }

    #[test]
    fn test_empty_name_rejected() {
        let exec = async_executor_fn(|_input: StepInput| async move {
            Ok(StepOutput::next(Content::Empty))
        });
        assert!(Step::executor("  ", exec).is_err());
    }

    #[tokio::test]
    async fn test_agent_step_streams_then_outputs() {
        let agent: Arc<dyn Agent> = Arc::new(ScriptedAgent {
            chunks: vec!["a", "b"],
            respond: true,
        });
        let step = Step::agent("chat", agent).unwrap();
        assert_eq!(step.kind(), "agent");

        let events: Vec<Event> = step
            .execute(StepInput::initial(Content::text("hi")))
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::content("a"));
        assert_eq!(events[1], Event::content("b"));
        assert_eq!(
            events[2],
            Event::Output(StepOutput::next("reply to hi"))
        );
    }

    #[tokio::test]
    async fn test_agent_without_response_is_unsuccessful() {
        let agent: Arc<dyn Agent> = Arc::new(ScriptedAgent {
            chunks: vec!["partial"],
            respond: false,
        });
        let step = Step::agent("chat", agent).unwrap();
        let events: Vec<Event> = step
            .execute(StepInput::initial(Content::text("hi")))
            .map(|e| e.unwrap())
            .collect()
            .await;

        match events.last() {
            Some(Event::Output(out)) => {
                assert!(!out.success);
                assert!(!out.stop);
            }
            other => panic!("expected terminal output, got {:?}", other),
        }
    }
}
