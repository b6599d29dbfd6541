//! Plugin registry - named agent and workflow factories
//!
//! Agents and workflows live in separate namespaces. A factory is stored at
//! registration and invoked on first access; the constructed value is cached
//! and shared by every later lookup. Registration is expected during startup;
//! after `freeze()` the registry only serves lookups.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

use mm_core::{Agent, Error, Result};
use mm_workflows::Workflow;

/// Typed configuration handed to an agent factory.
///
/// Validated once at registration; an invalid configuration is never stored.
pub trait FactoryConfig: Send + Sync + 'static {
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Configuration for factories that take none
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConfig;

impl FactoryConfig for NoConfig {}

/// What a factory sees while it constructs its value
pub struct FactoryContext<'a> {
    registry: &'a PluginRegistry,
    name: &'a str,
}

impl<'a> FactoryContext<'a> {
    /// Name the factory was registered under
    pub fn name(&self) -> &str {
        self.name
    }

    /// Resolve an agent, constructing it if needed.
    ///
    /// A factory must not resolve its own name.
    pub fn agent(&self, name: &str) -> Result<Arc<dyn Agent>> {
        self.registry.get_agent(name)
    }

    pub fn workflow(&self, name: &str) -> Result<Arc<Workflow>> {
        self.registry.build_workflow(name)
    }

    pub fn registry(&self) -> &PluginRegistry {
        self.registry
    }
}

type BoxedFactory<T> = Box<dyn Fn(&FactoryContext<'_>) -> Result<T> + Send + Sync>;

/// One registered name: its factory and, once built, the value
struct Entry<T> {
    factory: BoxedFactory<T>,
    instance: OnceCell<T>,
}

/// One namespace of the registry
struct Namespace<T> {
    label: &'static str,
    entries: RwLock<HashMap<String, Arc<Entry<T>>>>,
}

impl<T: Clone> Namespace<T> {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, name: String, factory: BoxedFactory<T>) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&name) {
            return Err(Error::duplicate(self.label, name));
        }
        entries.insert(
            name,
            Arc::new(Entry {
                factory,
                instance: OnceCell::new(),
            }),
        );
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<Arc<Entry<T>>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(self.label, name))
    }

    /// Build once and cache. Concurrent first callers wait for a single build.
    fn resolve(&self, registry: &PluginRegistry, name: &str) -> Result<T> {
        // the map lock is released before the factory runs, so factories may
        // resolve other names
        let entry = self.entry(name)?;
        entry
            .instance
            .get_or_try_init(|| {
                debug!(namespace = self.label, name = %name, "Constructing from factory");
                let ctx = FactoryContext { registry, name };
                (entry.factory)(&ctx).map_err(|e| {
                    warn!(namespace = self.label, name = %name, error = %e, "Factory failed");
                    e
                })
            })
            .cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Registry of agent and workflow factories
pub struct PluginRegistry {
    agents: Namespace<Arc<dyn Agent>>,
    workflows: Namespace<Arc<Workflow>>,
    frozen: AtomicBool,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            agents: Namespace::new("agent"),
            workflows: Namespace::new("workflow"),
            frozen: AtomicBool::new(false),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(Error::invalid_config("registry is frozen"));
        }
        Ok(())
    }

    fn validate_name(namespace: &str, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::invalid_config(format!(
                "{} name must not be empty",
                namespace
            )));
        }
        Ok(())
    }

    /// Register an agent factory with its configuration.
    ///
    /// Fails with `DuplicateName` if the name is taken and `InvalidConfig`
    /// if the configuration does not validate.
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
        let name = name.into();
        self.ensure_writable()?;
        Self::validate_name("agent", &name)?;
        config.validate()?;

        self.agents.insert(
            name.clone(),
            Box::new(move |ctx: &FactoryContext<'_>| factory(ctx, &config)),
        )?;
        info!(agent = %name, "Registered agent factory");
        Ok(())
    }

    /// Register an already constructed agent
    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let name = agent.name().to_string();
        self.register_agent_factory(
            name,
            move |_ctx: &FactoryContext<'_>, _: &NoConfig| Ok(Arc::clone(&agent)),
            NoConfig,
        )
    }

    /// Register a workflow factory
    pub fn register_workflow_factory<F>(&self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&FactoryContext<'_>) -> Result<Workflow> + Send + Sync + 'static,
    {
        let name = name.into();
        self.ensure_writable()?;
        Self::validate_name("workflow", &name)?;

        let expected = name.clone();
        self.workflows.insert(
            name.clone(),
            Box::new(move |ctx: &FactoryContext<'_>| {
                let workflow = factory(ctx)?;
                if workflow.name() != expected {
                    debug!(
                        registered = %expected,
                        built = %workflow.name(),
                        "Workflow name differs from registration name"
                    );
                }
                Ok(Arc::new(workflow))
            }),
        )?;
        info!(workflow = %name, "Registered workflow factory");
        Ok(())
    }

    /// Resolve an agent by name, constructing it on first access
    #[instrument(skip(self), level = "debug")]
    pub fn get_agent(&self, name: &str) -> Result<Arc<dyn Agent>> {
        self.agents.resolve(self, name)
    }

    /// Resolve a workflow by name, constructing it on first access
    #[instrument(skip(self), level = "debug")]
    pub fn build_workflow(&self, name: &str) -> Result<Arc<Workflow>> {
        self.workflows.resolve(self, name)
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.agents.contains(name)
    }

    pub fn has_workflow(&self, name: &str) -> bool {
        self.workflows.contains(name)
    }

    /// Registered agent names, sorted
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.names()
    }

    /// Registered workflow names, sorted
    pub fn workflow_names(&self) -> Vec<String> {
        self.workflows.names()
    }

    /// Number of registered factories across both namespaces
    pub fn len(&self) -> usize {
        self.agents.len() + self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting registrations
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            info!(
                agents = self.agents.len(),
                workflows = self.workflows.len(),
                "Registry frozen"
            );
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("agents", &self.agent_names())
            .field("workflows", &self.workflow_names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
