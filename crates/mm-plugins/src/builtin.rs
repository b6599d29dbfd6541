//! Built-in agents and workflows

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use mm_core::{
    Agent, AgentEvent, AgentRequest, AgentResponse, AgentStream, ContentEvent, Error, Result,
};
use mm_workflows::{Step, Workflow};

use crate::registry::{FactoryConfig, FactoryContext, PluginRegistry};

pub const ECHO_AGENT: &str = "echo";
pub const ECHO_WORKFLOW: &str = "echo";

/// Echo agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoConfig {
    /// Pause between streamed words
    #[serde(default)]
    pub delay_ms: u64,
}

impl FactoryConfig for EchoConfig {
    fn validate(&self) -> Result<()> {
        if self.delay_ms > 10_000 {
            return Err(Error::invalid_config("echo delay_ms must be at most 10000"));
        }
        Ok(())
    }
}

/// Echo agent for testing: streams the prompt back word by word, then
/// responds with the whole prompt
pub struct EchoAgent {
    name: String,
    delay: Duration,
}

impl EchoAgent {
    pub fn new(name: impl Into<String>, config: &EchoConfig) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echoes its prompt back, streaming one word at a time"
    }

    async fn complete(&self, request: AgentRequest) -> Result<AgentStream> {
        let (tx, rx) = mpsc::channel(16);
        let text = request.prompt.to_text();
        let delay = self.delay;

        tokio::spawn(async move {
            let words: Vec<&str> = text.split_inclusive(' ').collect();
            for word in words {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let event = AgentEvent::Content(ContentEvent::new(word));
                if tx.send(Ok(event)).await.is_err() {
                    debug!("Echo receiver dropped");
                    return;
                }
            }
            let _ = tx
                .send(Ok(AgentEvent::Response(AgentResponse::new(text.clone()))))
                .await;
        });

        Ok(rx)
    }
}

fn echo_agent_factory(ctx: &FactoryContext<'_>, config: &EchoConfig) -> Result<Arc<dyn Agent>> {
    Ok(Arc::new(EchoAgent::new(ctx.name(), config)))
}

fn echo_workflow_factory(ctx: &FactoryContext<'_>) -> Result<Workflow> {
    let agent = ctx.agent(ECHO_AGENT)?;
    Workflow::builder(ctx.name())
        .description("Single echo agent step")
        .step(Step::agent("echo", agent)?.with_description("Echo the input"))
        .build()
}

/// Register the built-in `echo` agent and `echo` workflow
pub fn enable_builtins(registry: &PluginRegistry) -> Result<()> {
    registry.register_agent_factory(ECHO_AGENT, echo_agent_factory, EchoConfig::default())?;
    registry.register_workflow_factory(ECHO_WORKFLOW, echo_workflow_factory)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::Content;

    #[tokio::test]
    async fn test_echo_agent_streams_words() {
        let agent = EchoAgent::new("echo", &EchoConfig::default());
        let mut rx = agent
            .complete(AgentRequest::new("hello big world"))
            .await
            .unwrap();

        let mut chunks = Vec::new();
        let mut response = None;
        while let Some(event) = rx.recv().await {
            match event.unwrap() {
                AgentEvent::Content(c) => chunks.push(c.content.to_text()),
                AgentEvent::Response(r) => response = Some(r),
            }
        }
        assert_eq!(chunks, vec!["hello ", "big ", "world"]);
        assert_eq!(response.unwrap().content, Content::text("hello big world"));
    }

    #[test]
    fn test_enable_builtins() {
        let registry = PluginRegistry::new();
        enable_builtins(&registry).unwrap();
        assert!(registry.has_agent(ECHO_AGENT));
        let wf = registry.build_workflow(ECHO_WORKFLOW).unwrap();
        assert_eq!(wf.steps()[0].kind(), "agent");

        // builtins are registered once
        assert!(enable_builtins(&registry).is_err());
    }

    #[test]
    fn test_echo_config_bounds() {
        assert!(EchoConfig { delay_ms: 20_000 }.validate().is_err());
        assert!(EchoConfig { delay_ms: 5 }.validate().is_ok());
    }
}
