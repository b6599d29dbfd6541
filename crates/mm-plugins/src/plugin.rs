//! Plugin trait and loader
//!
//! A plugin is a package of factories. The loader knows every plugin compiled
//! into the host and registers the ones selected by configuration.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use mm_core::{PluginsConfig, Result};

use crate::registry::PluginRegistry;

/// Plugin metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// A package of agent and workflow factories
pub trait Plugin: Send + Sync {
    /// Plugin name (unique among loaded plugins)
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    fn description(&self) -> &str {
        ""
    }

    /// Register this plugin's factories
    fn register(&self, registry: &PluginRegistry) -> Result<()>;

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: self.name().to_string(),
            version: self.version().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// Registers known plugins into a registry
pub struct PluginLoader {
    plugins: Vec<Arc<dyn Plugin>>,
    auto_load: Vec<String>,
    enabled: AtomicBool,
}

impl PluginLoader {
    /// Loader that enables every known plugin
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            auto_load: Vec::new(),
            enabled: AtomicBool::new(false),
        }
    }

    /// Loader restricted to `config.auto_load` (empty means all)
    pub fn with_config(config: &PluginsConfig) -> Self {
        Self {
            auto_load: config.auto_load.clone(),
            ..Self::new()
        }
    }

    /// Add a known plugin
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(&self) -> Vec<PluginMetadata> {
        self.plugins.iter().map(|p| p.metadata()).collect()
    }

    fn selected(&self) -> Vec<&Arc<dyn Plugin>> {
        if self.auto_load.is_empty() {
            return self.plugins.iter().collect();
        }

        for name in &self.auto_load {
            if !self.plugins.iter().any(|p| p.name() == name) {
                warn!(plugin = %name, "Unknown plugin in auto_load list");
            }
        }
        self.plugins
            .iter()
            .filter(|p| self.auto_load.iter().any(|n| n == p.name()))
            .collect()
    }

    /// Register the selected plugins. Returns the names that loaded.
    ///
    /// A plugin that fails to register is logged and skipped. Calling this
    /// more than once is a no-op.
    pub fn enable_plugins(&self, registry: &PluginRegistry) -> Vec<String> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            warn!("Plugins already enabled, ignoring");
            return Vec::new();
        }

        let mut loaded = Vec::new();
        for plugin in self.selected() {
            match plugin.register(registry) {
                Ok(()) => {
                    info!(plugin = %plugin.name(), version = %plugin.version(), "Loaded plugin");
                    loaded.push(plugin.name().to_string());
                }
                Err(e) => {
                    warn!(plugin = %plugin.name(), error = %e, "Failed to load plugin");
                }
            }
        }

        info!(count = loaded.len(), "Plugins enabled");
        loaded
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_core::Error;
    use mm_workflows::Workflow;

    struct WorkflowPlugin {
        name: &'static str,
        workflow: &'static str,
    }

    impl Plugin for WorkflowPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn register(&self, registry: &PluginRegistry) -> Result<()> {
            let name = self.workflow;
            registry.register_workflow_factory(name, move |_ctx| Workflow::new(name, vec![]))
        }
    }

    struct BrokenPlugin;

    impl Plugin for BrokenPlugin {
        fn name(&self) -> &str {
            "broken"
        }

        fn register(&self, _registry: &PluginRegistry) -> Result<()> {
            Err(Error::internal("cannot register"))
        }
    }

    fn plugin(name: &'static str, workflow: &'static str) -> Arc<dyn Plugin> {
        Arc::new(WorkflowPlugin { name, workflow })
    }

    #[test]
    fn test_failing_plugin_is_skipped() {
        let registry = PluginRegistry::new();
        let loader = PluginLoader::new()
            .with_plugin(plugin("one", "wf_one"))
            .with_plugin(Arc::new(BrokenPlugin))
            .with_plugin(plugin("two", "wf_two"));

        let loaded = loader.enable_plugins(&registry);
        assert_eq!(loaded, vec!["one", "two"]);
        assert!(registry.has_workflow("wf_one"));
        assert!(registry.has_workflow("wf_two"));
    }

    #[test]
    fn test_conflicting_plugin_is_skipped() {
        let registry = PluginRegistry::new();
        let loader = PluginLoader::new()
            .with_plugin(plugin("first", "shared"))
            .with_plugin(plugin("second", "shared"));

        assert_eq!(loader.enable_plugins(&registry), vec!["first"]);
    }

    #[test]
    fn test_enable_twice_is_noop() {
        let registry = PluginRegistry::new();
        let loader = PluginLoader::new().with_plugin(plugin("one", "wf_one"));
        assert_eq!(loader.enable_plugins(&registry).len(), 1);
        assert!(loader.enable_plugins(&registry).is_empty());
        assert!(loader.is_enabled());
    }

    #[test]
    fn test_auto_load_filters_plugins() {
        let registry = PluginRegistry::new();
        let config = PluginsConfig {
            auto_load: vec!["two".to_string(), "missing".to_string()],
            ..Default::default()
        };
        let loader = PluginLoader::with_config(&config)
            .with_plugin(plugin("one", "wf_one"))
            .with_plugin(plugin("two", "wf_two"));

        assert_eq!(loader.enable_plugins(&registry), vec!["two"]);
        assert!(!registry.has_workflow("wf_one"));
    }
}
