//! Core types and utilities for mindmatrix
//!
//! # Modules
//!
//! - `agent`: the agent capability consumed by agent steps
//! - `config`: configuration loading
//! - `error`: error taxonomy and Result alias
//! - `types`: content, events and the step input/output contract

pub mod agent;
pub mod config;
pub mod error;
pub mod types;

pub use agent::{Agent, AgentEvent, AgentRequest, AgentResponse, AgentStream};
pub use config::{EngineConfig, MindMatrixConfig, PluginsConfig, ServiceConfig};
pub use error::{Error, Result};
pub use types::*;
