//! Agent capability
//!
//! An agent turns a prompt into a response, optionally streaming partial
//! content first. Model-specific behaviour lives entirely behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{Content, ContentEvent};

/// Request to an agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Prompt or context for this completion
    pub prompt: Content,
    /// Original input of the enclosing run, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_input: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<Content>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_workflow_input(mut self, input: Content) -> Self {
        self.workflow_input = Some(input);
        self
    }
}

/// Final response of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: Content,
}

impl AgentResponse {
    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Item of an agent's response stream
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Partial content
    Content(ContentEvent),
    /// Final response; nothing after it is read
    Response(AgentResponse),
}

/// Stream of agent events. Dropping the receiver tells the producer to stop.
pub type AgentStream = mpsc::Receiver<Result<AgentEvent>>;

/// Agent trait
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name
    fn name(&self) -> &str;

    /// Description of what this agent does
    fn description(&self) -> &str {
        ""
    }

    /// Start a completion
    async fn complete(&self, request: AgentRequest) -> Result<AgentStream>;
}
