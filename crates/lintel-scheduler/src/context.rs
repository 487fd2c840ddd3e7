//! Seam to the analyzer-hosting layer
//!
//! The scheduler never analyzes anything itself. It drives an
//! [ExecutionContext] (the live module registry plus analysis entry point)
//! built by a [ContextFactory] from the engine configuration and the loaded
//! plugins, and replaces it wholesale on reset.

use crate::analyze::AnalyzeCommand;
use crate::config::EngineConfig;
use crate::module::{FileEvent, ModuleInfo, ModuleKey};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Live handle used by the consumer thread to run commands.
///
/// Methods are only ever called from the scheduler's consumer thread, except
/// [stop](Self::stop), which the scheduler may call from the thread that
/// resets or stops it while a cancelled command is still returning.
pub trait ExecutionContext: Send + Sync {
    /// Register a module in the registry
    fn register_module(&self, module: &ModuleInfo) -> anyhow::Result<()>;

    /// Remove a module from the registry
    fn unregister_module(&self, key: &ModuleKey) -> anyhow::Result<()>;

    /// Forward a file change to the module's analyzers
    fn notify_module_event(&self, key: &ModuleKey, event: &FileEvent) -> anyhow::Result<()>;

    /// Analyze the command's files.
    ///
    /// Implementations poll `command.cancel_monitor()` and return early once
    /// it is raised.
    fn analyze(&self, command: &AnalyzeCommand) -> anyhow::Result<()>;

    /// Release every resource held by this context
    fn stop(&self) -> anyhow::Result<()>;
}

/// Builds execution contexts on startup and on reset
pub trait ContextFactory: Send + Sync {
    /// Build and start a new context
    fn create(
        &self,
        config: &EngineConfig,
        plugins: &PluginSet,
    ) -> anyhow::Result<Arc<dyn ExecutionContext>>;
}

impl<F> ContextFactory for F
where
    F: Fn(&EngineConfig, &PluginSet) -> anyhow::Result<Arc<dyn ExecutionContext>> + Send + Sync,
{
    fn create(
        &self,
        config: &EngineConfig,
        plugins: &PluginSet,
    ) -> anyhow::Result<Arc<dyn ExecutionContext>> {
        self(config, plugins)
    }
}

/// An analyzer plugin available to the execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Plugin key (e.g. language name)
    pub key: String,
    /// Location of the plugin artifact
    pub path: PathBuf,
    /// Plugin version, if known
    #[serde(default)]
    pub version: Option<String>,
}

impl PluginDescriptor {
    /// Create a plugin descriptor without version
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            version: None,
        }
    }
}

/// The set of plugins a context is built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginSet {
    plugins: Vec<PluginDescriptor>,
}

impl PluginSet {
    /// Empty plugin set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin
    pub fn with(mut self, plugin: PluginDescriptor) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Look up a plugin by key
    pub fn get(&self, key: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.key == key)
    }

    /// Iterate plugins
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.iter()
    }

    /// Number of plugins
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// True if no plugin is loaded
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl FromIterator<PluginDescriptor> for PluginSet {
    fn from_iter<I: IntoIterator<Item = PluginDescriptor>>(iter: I) -> Self {
        Self {
            plugins: iter.into_iter().collect(),
        }
    }
}
