//! MindMatrix service
//!
//! Host side of the workflow system:
//! - `MindMatrix` facade owning the plugin registry and the engine
//! - Chat request handling (user message extraction, sessions)
//! - Relay of run events to transport frames
//! - The demo plugin with `simple_workflow`

pub mod chat;
pub mod demo;
pub mod host;
pub mod relay;

pub use chat::{ChatRequest, Message};
pub use demo::DemoPlugin;
pub use host::{ChatRun, HandlerKind, MindMatrix};
pub use relay::{relay, HostFrame};
