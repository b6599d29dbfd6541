//! Error types for mindmatrix

use std::time::Duration;
use thiserror::Error;

/// Main error type for registry, workflow and host operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("{namespace} '{name}' is already registered")]
    DuplicateName { namespace: &'static str, name: String },

    #[error("{namespace} '{name}' not found")]
    NotFound { namespace: &'static str, name: String },

    #[error("Malformed step '{step}': {reason}")]
    MalformedStep { step: String, reason: String },

    #[error("Step '{step}' timed out after {timeout:?}")]
    StepTimeout { step: String, timeout: Duration },

    #[error("Step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a duplicate-name error
    pub fn duplicate(namespace: &'static str, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            namespace,
            name: name.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(namespace: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            namespace,
            name: name.into(),
        }
    }

    /// Create a malformed step error
    pub fn malformed_step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedStep {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Create a step execution error
    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    /// Create an agent error
    pub fn agent(msg: impl Into<String>) -> Self {
        Error::Agent(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Errors raised while registering or constructing, before any run starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateName { .. } | Error::InvalidConfig(_) | Error::MalformedStep { .. }
        )
    }

    /// Short machine-readable kind, used in run outcomes and host frames.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DuplicateName { .. } => "duplicate_name",
            Error::NotFound { .. } => "not_found",
            Error::MalformedStep { .. } => "malformed_step",
            Error::StepTimeout { .. } => "step_timeout",
            Error::StepExecution { .. } => "step_execution",
            Error::Cancelled => "cancelled",
            Error::InvalidConfig(_) => "invalid_config",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Agent(_) => "agent",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
