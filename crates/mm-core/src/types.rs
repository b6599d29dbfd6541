//! Data model shared by steps, agents and the engine
//!
//! - `Content`: opaque payload produced by a step
//! - `Event`: a content fragment or a step's terminal output
//! - `StepInput` / `StepOutput`: the contract around a single step

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Payload carried between steps. The engine never interprets it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Data(Value),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Empty => true,
            Content::Text(s) => s.is_empty(),
            Content::Data(v) => v.is_null(),
        }
    }

    /// Borrow the text if this is textual content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a string; structured data is serialized as JSON
    pub fn to_text(&self) -> String {
        match self {
            Content::Empty => String::new(),
            Content::Text(s) => s.clone(),
            Content::Data(Value::String(s)) => s.clone(),
            Content::Data(v) => v.to_string(),
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Value> for Content {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Content::Empty,
            Value::String(s) => Content::Text(s),
            other => Content::Data(other),
        }
    }
}

/// Structured side output attached to a content event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
}

impl Artifact {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            kind: kind.into(),
            content,
        }
    }
}

/// Incremental output emitted while a step is still executing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentEvent {
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl ContentEvent {
    pub fn new(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Terminal result of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub content: Content,
    /// Terminate the workflow after this step
    #[serde(default)]
    pub stop: bool,
    /// Whether the step considers its own work successful
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl StepOutput {
    /// Successful output that lets the workflow continue
    pub fn next(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            stop: false,
            success: true,
        }
    }

    /// Successful output that ends the workflow
    pub fn finish(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            stop: true,
            success: true,
        }
    }

    /// Unsuccessful output that ends the workflow
    pub fn failed(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            stop: true,
            success: false,
        }
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

/// A unit of a step's event sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Content(ContentEvent),
    Output(StepOutput),
}

impl Event {
    pub fn content(content: impl Into<Content>) -> Self {
        Event::Content(ContentEvent::new(content))
    }
}

impl From<ContentEvent> for Event {
    fn from(event: ContentEvent) -> Self {
        Event::Content(event)
    }
}

impl From<StepOutput> for Event {
    fn from(output: StepOutput) -> Self {
        Event::Output(output)
    }
}

/// Input handed to a step. Built fresh for every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    /// Content of the preceding step's terminal output, or the workflow input for the first step
    pub previous_step_content: Content,
    /// The input of the whole run
    pub workflow_input: Content,
}

impl StepInput {
    pub fn new(previous_step_content: Content, workflow_input: Content) -> Self {
        Self {
            previous_step_content,
            workflow_input,
        }
    }

    /// Input for the first step of a run
    pub fn initial(workflow_input: Content) -> Self {
        Self {
            previous_step_content: workflow_input.clone(),
            workflow_input,
        }
    }
}
