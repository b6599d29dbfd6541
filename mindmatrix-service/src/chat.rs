//! Chat requests - extracting workflow input from a chat completion body

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mm_core::{Error, Result};

/// One message of a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// "user", "assistant", "system", ...
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Chat completion request as received from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Existing session to continue; a new one is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Agent or workflow name
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            user_id: None,
            session_id: None,
            model: model.into(),
            messages,
            stream: false,
        }
    }

    /// Content of the last `user` message
    pub fn extract_user_message(&self) -> Result<&str> {
        if self.messages.is_empty() {
            return Err(Error::invalid_request("no messages provided"));
        }

        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::invalid_request("no user message found"))
    }

    /// Session id, generating one if the client sent none
    pub fn ensure_session_id(&mut self) -> &str {
        self.session_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .as_str()
    }
}
