//! Plugin registry.
//!
//! Plugins are registered as named constructors at process start. Each run
//! instantiates a fresh set, so plugins never carry state across runs. A
//! constructor that fails is remembered as a load failure instead of
//! aborting the whole run.

use super::discovery::{CMakeDiscoveryPlugin, FileTypeDiscoveryPlugin};
use super::reporting::{
    ConsoleReportingPlugin, JsonReportingPlugin, MarkdownReportingPlugin,
};
use super::tool::{BanditToolPlugin, LizardToolPlugin, PylintToolPlugin, ShellcheckToolPlugin};
use super::{DiscoveryPlugin, Plugin, PluginError, PluginKind, ReportingPlugin, ToolPlugin};
use crate::error::OrchestratorError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

type Factory<P> = Box<dyn Fn() -> Result<Arc<P>, PluginError> + Send + Sync>;

/// Registered constructors for one plugin kind.
struct Catalog<P: ?Sized> {
    kind: PluginKind,
    factories: BTreeMap<String, Factory<P>>,
}

impl<P: ?Sized + Plugin> Catalog<P> {
    fn new(kind: PluginKind) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    fn register(&mut self, name: &str, factory: Factory<P>) {
        if self.factories.insert(name.to_string(), factory).is_some() {
            warn!("{} plugin {} registered twice, keeping the last one", self.kind, name);
        }
    }

    fn instantiate(&self) -> LoadedPlugins<P> {
        let mut loaded = LoadedPlugins {
            kind: self.kind,
            plugins: BTreeMap::new(),
            failures: BTreeMap::new(),
        };

        for (name, factory) in &self.factories {
            match factory() {
                Ok(plugin) if plugin.name() == name.as_str() => {
                    loaded.plugins.insert(name.clone(), plugin);
                }
                Ok(plugin) => {
                    let reason = format!("constructor produced plugin {}", plugin.name());
                    warn!("{} plugin {} failed to load: {}", self.kind, name, reason);
                    loaded.failures.insert(name.clone(), reason);
                }
                Err(e) => {
                    warn!("{} plugin {} failed to load: {}", self.kind, name, e);
                    loaded.failures.insert(name.clone(), e.to_string());
                }
            }
        }

        loaded
    }
}

/// The instantiated plugins of one kind for a single run.
pub struct LoadedPlugins<P: ?Sized> {
    kind: PluginKind,
    plugins: BTreeMap<String, Arc<P>>,
    failures: BTreeMap<String, String>,
}

impl<P: ?Sized> LoadedPlugins<P> {
    /// Look up a plugin by name.
    ///
    /// Distinguishes a plugin that is registered but failed to construct
    /// from one that does not exist at all.
    pub fn get(&self, name: &str) -> Result<Arc<P>, OrchestratorError> {
        if let Some(plugin) = self.plugins.get(name) {
            return Ok(Arc::clone(plugin));
        }

        match self.failures.get(name) {
            Some(reason) => Err(OrchestratorError::PluginLoad {
                kind: self.kind,
                name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(OrchestratorError::PluginNotFound {
                kind: self.kind,
                name: name.to_string(),
            }),
        }
    }

    /// Names of every registered plugin of this kind, loaded or not.
    pub fn names(&self) -> BTreeSet<String> {
        self.plugins
            .keys()
            .chain(self.failures.keys())
            .cloned()
            .collect()
    }

    /// Successfully constructed plugins, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<P>)> {
        self.plugins.iter().map(|(name, plugin)| (name.as_str(), plugin))
    }

    /// Plugins whose constructor failed, with the reason.
    pub fn failures(&self) -> &BTreeMap<String, String> {
        &self.failures
    }
}

/// All registered plugins, by capability.
pub struct PluginRegistry {
    discovery: Catalog<dyn DiscoveryPlugin>,
    tool: Catalog<dyn ToolPlugin>,
    reporting: Catalog<dyn ReportingPlugin>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            discovery: Catalog::new(PluginKind::Discovery),
            tool: Catalog::new(PluginKind::Tool),
            reporting: Catalog::new(PluginKind::Reporting),
        }
    }

    /// The registry with every plugin shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_discovery("python", || Ok(Arc::new(FileTypeDiscoveryPlugin::python())));
        registry.register_discovery("c", || Ok(Arc::new(FileTypeDiscoveryPlugin::c())));
        registry.register_discovery("shell", || Ok(Arc::new(FileTypeDiscoveryPlugin::shell())));
        registry.register_discovery("cmake", || Ok(Arc::new(CMakeDiscoveryPlugin)));

        registry.register_tool("pylint", || Ok(Arc::new(PylintToolPlugin::new()?)));
        registry.register_tool("bandit", || Ok(Arc::new(BanditToolPlugin::new()?)));
        registry.register_tool("shellcheck", || Ok(Arc::new(ShellcheckToolPlugin::new()?)));
        registry.register_tool("lizard", || Ok(Arc::new(LizardToolPlugin::new()?)));

        registry.register_reporting("print_to_console", || Ok(Arc::new(ConsoleReportingPlugin)));
        registry.register_reporting("write_json", || Ok(Arc::new(JsonReportingPlugin)));
        registry.register_reporting("write_markdown", || Ok(Arc::new(MarkdownReportingPlugin)));

        registry
    }

    pub fn register_discovery<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn DiscoveryPlugin>, PluginError> + Send + Sync + 'static,
    {
        self.discovery.register(name, Box::new(factory));
    }

    pub fn register_tool<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn ToolPlugin>, PluginError> + Send + Sync + 'static,
    {
        self.tool.register(name, Box::new(factory));
    }

    pub fn register_reporting<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn ReportingPlugin>, PluginError> + Send + Sync + 'static,
    {
        self.reporting.register(name, Box::new(factory));
    }

    /// Instantiate every discovery plugin.
    pub fn discovery_plugins(&self) -> LoadedPlugins<dyn DiscoveryPlugin> {
        self.discovery.instantiate()
    }

    /// Instantiate every tool plugin.
    pub fn tool_plugins(&self) -> LoadedPlugins<dyn ToolPlugin> {
        self.tool.instantiate()
    }

    /// Instantiate every reporting plugin.
    pub fn reporting_plugins(&self) -> LoadedPlugins<dyn ReportingPlugin> {
        self.reporting.instantiate()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
