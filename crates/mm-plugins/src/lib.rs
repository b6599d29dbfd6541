//! mm-plugins: registry of pluggable agents and workflows
//!
//! Features:
//! - Separate agent and workflow namespaces, duplicate names rejected
//! - Typed factory configuration validated at registration
//! - Lazy, cached, thread-safe construction
//! - Plugin trait and loader for packaged factories
//! - Built-in `echo` agent and workflow

pub mod builtin;
pub mod plugin;
pub mod registry;

pub use builtin::{enable_builtins, EchoAgent, EchoConfig};
pub use plugin::{Plugin, PluginLoader, PluginMetadata};
pub use registry::{FactoryConfig, FactoryContext, NoConfig, PluginRegistry};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::plugin::{Plugin, PluginLoader};
    pub use super::registry::{FactoryConfig, FactoryContext, NoConfig, PluginRegistry};
}
