//! Host facade - owns the registry and the engine
//!
//! Startup: build `MindMatrix` from configuration, add compiled-in plugins,
//! register any extra factories, then `start()`. After start the registry is
//! frozen and the host only serves runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use mm_core::{Agent, Content, Error, MindMatrixConfig, Result};
use mm_plugins::{
    enable_builtins, FactoryConfig, FactoryContext, Plugin, PluginLoader, PluginRegistry,
};
use mm_workflows::{RunHandle, Step, Workflow, WorkflowEngine};

use crate::chat::ChatRequest;

/// What a run request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Agent,
    Workflow,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Agent => f.write_str("agent"),
            HandlerKind::Workflow => f.write_str("workflow"),
        }
    }
}

impl FromStr for HandlerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "agent" => Ok(HandlerKind::Agent),
            "workflow" => Ok(HandlerKind::Workflow),
            other => Err(Error::invalid_request(format!(
                "unknown handler kind '{}'",
                other
            ))),
        }
    }
}

/// A chat run plus the session it belongs to
pub struct ChatRun {
    pub session_id: String,
    pub handle: RunHandle,
}

/// Host facade
pub struct MindMatrix {
    config: MindMatrixConfig,
    registry: Arc<PluginRegistry>,
    engine: WorkflowEngine,
    loader: PluginLoader,
    started: AtomicBool,
}

impl MindMatrix {
    pub fn new(config: MindMatrixConfig) -> Self {
        let engine = WorkflowEngine::new(&config.engine);
        let loader = PluginLoader::with_config(&config.plugins);
        Self {
            config,
            registry: Arc::new(PluginRegistry::new()),
            engine,
            loader,
            started: AtomicBool::new(false),
        }
    }

    /// Make a compiled-in plugin known to the loader
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.loader = self.loader.with_plugin(plugin);
        self
    }

    pub fn config(&self) -> &MindMatrixConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    pub fn register_agent_factory<C, F>(
        &self,
        name: impl Into<String>,
        factory: F,
        config: C,
    ) -> Result<()>
    where
        C: FactoryConfig,
        F: Fn(&FactoryContext<'_>, &C) -> Result<Arc<dyn Agent>> + Send + Sync + 'static,
    {
        self.registry.register_agent_factory(name, factory, config)
    }

    pub fn register_workflow_factory<F>(&self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&FactoryContext<'_>) -> Result<Workflow> + Send + Sync + 'static,
    {
        self.registry.register_workflow_factory(name, factory)
    }

    pub fn get_agent(&self, name: &str) -> Result<Arc<dyn Agent>> {
        self.registry.get_agent(name)
    }

    /// Enable builtins and plugins per configuration, then freeze the registry
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("MindMatrix already started");
            return Ok(());
        }

        if self.config.plugins.enable_builtins {
            enable_builtins(&self.registry)?;
            info!("Enabled built-in agents and workflows");
        }
        if self.config.plugins.enable_plugins {
            self.loader.enable_plugins(&self.registry);
        }
        self.registry.freeze();

        info!(
            agents = ?self.registry.agent_names(),
            workflows = ?self.registry.workflow_names(),
            "MindMatrix started"
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Resolve a handler into a runnable workflow; an agent becomes a one-step workflow
    pub fn resolve(&self, kind: HandlerKind, name: &str) -> Result<Arc<Workflow>> {
        match kind {
            HandlerKind::Workflow => self.registry.build_workflow(name),
            HandlerKind::Agent => {
                let agent = self.registry.get_agent(name)?;
                let workflow = Workflow::new(name, vec![Step::agent(name, agent)?])?;
                Ok(Arc::new(workflow))
            }
        }
    }

    /// Start a run of an agent or workflow
    pub fn run(&self, kind: HandlerKind, name: &str, input: impl Into<Content>) -> Result<RunHandle> {
        let workflow = self.resolve(kind, name)?;
        let handle = self.engine.run(workflow, input);
        info!(kind = %kind, name = %name, run_id = %handle.run_id(), "Run started");
        Ok(handle)
    }

    /// Start a run for a chat request.
    ///
    /// The handler is `request.model`, falling back to the configured default
    /// workflow when the model is empty.
    pub fn chat(&self, kind: HandlerKind, mut request: ChatRequest) -> Result<ChatRun> {
        let message = request.extract_user_message()?.to_string();
        let session_id = request.ensure_session_id().to_string();

        let name = if request.model.is_empty() {
            match (kind, &self.config.service.default_workflow) {
                (HandlerKind::Workflow, Some(default)) => default.clone(),
                _ => return Err(Error::invalid_request("no model given")),
            }
        } else {
            request.model.clone()
        };

        let handle = self.run(kind, &name, message)?;
        Ok(ChatRun { session_id, handle })
    }
}

impl fmt::Debug for MindMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MindMatrix")
            .field("registry", &self.registry)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_kind_parse() {
        assert_eq!("agent".parse::<HandlerKind>().unwrap(), HandlerKind::Agent);
        assert_eq!(
            "workflow".parse::<HandlerKind>().unwrap(),
            HandlerKind::Workflow
        );
        assert!("tool".parse::<HandlerKind>().is_err());
    }

    #[test]
    fn test_start_freezes_registry() {
        let mm = MindMatrix::new(MindMatrixConfig::default());
        mm.start().unwrap();
        assert!(mm.registry().is_frozen());
        assert!(mm.registry().has_workflow("echo"));
        assert!(mm
            .register_workflow_factory("late", |_ctx| Workflow::new("late", vec![]))
            .is_err());

        // second start is a no-op
        mm.start().unwrap();
    }

    #[test]
    fn test_builtins_can_be_disabled() {
        let mut config = MindMatrixConfig::default();
        config.plugins.enable_builtins = false;
        let mm = MindMatrix::new(config);
        mm.start().unwrap();
        assert!(mm.registry().is_empty());
    }

    #[test]
    fn test_unknown_handler_not_found() {
        let mm = MindMatrix::new(MindMatrixConfig::default());
        mm.start().unwrap();
        assert!(matches!(
            mm.resolve(HandlerKind::Agent, "ghost"),
            Err(Error::NotFound { .. })
        ));
    }
}
