//! Configuration file handling.
//!
//! This module handles loading and layering configuration from the
//! built-in defaults, a `.checkwright.toml` file and command line
//! overrides. Configuration holds two things: per-plugin option bags and
//! the catalog of levels.

use crate::plugins::PluginKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Free-form options for one plugin.
pub type OptionBag = toml::Table;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".checkwright.toml";

/// Option key that switches a plugin off inside a level.
const ENABLED_KEY: &str = "enabled";

const BUILTIN_CONFIG: &str = r#"
[general]
timeout_seconds = 300
max_concurrent = 4
exclude_dirs = [".git", "target", "node_modules", "vendor", "dist", "build", "__pycache__", ".venv", "venv", ".idea", ".vscode"]

[plugins.pylint]
flags = ""

[plugins.bandit]
flags = ""

[plugins.shellcheck]
flags = ""

[plugins.lizard]
flags = ""

[levels.default.tool.pylint]
[levels.default.tool.bandit]
[levels.default.tool.shellcheck]
[levels.default.tool.lizard]
[levels.default.reporting.print_to_console]
[levels.default.reporting.write_json]

[levels.security.tool.bandit]
[levels.security.tool.shellcheck]
[levels.security.reporting.print_to_console]
[levels.security.reporting.write_json]

[levels.complexity.tool.lizard]
flags = "-C 10"
[levels.complexity.reporting.print_to_console]

[levels.strict]
inherits_from = "default"

[levels.strict.tool.pylint]
flags = "--enable=all"
[levels.strict.reporting.write_markdown]
"#;

/// Errors raised while loading or combining configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Built-in configuration is invalid: {0}")]
    Builtin(#[source] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Level {0} is not defined")]
    UnknownLevel(String),

    #[error("Level inheritance cycle: {}", .0.join(" -> "))]
    InheritanceCycle(Vec<String>),

    #[error("Invalid tool option {0:?}, expected plugin.key=value")]
    InvalidOverride(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Option bags keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, OptionBag>,

    /// Level catalog.
    #[serde(default)]
    pub levels: BTreeMap<String, LevelConfig>,
}

/// General settings. Unset fields fall through to the layer below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default per-invocation timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Plugins run concurrently within one wave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,

    /// Directory names skipped by discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_dirs: Option<Vec<String>>,
}

impl GeneralConfig {
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(300)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(4).max(1)
    }

    pub fn exclude_dirs(&self) -> Vec<String> {
        self.exclude_dirs.clone().unwrap_or_default()
    }

    fn layer(&mut self, other: GeneralConfig) {
        if other.timeout_seconds.is_some() {
            self.timeout_seconds = other.timeout_seconds;
        }
        if other.max_concurrent.is_some() {
            self.max_concurrent = other.max_concurrent;
        }
        if other.exclude_dirs.is_some() {
            self.exclude_dirs = other.exclude_dirs;
        }
    }
}

/// A level as written in a configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Parent level whose entries this level extends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,

    /// Discovery plugins; absent means every installed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<BTreeMap<String, OptionBag>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<BTreeMap<String, OptionBag>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<BTreeMap<String, OptionBag>>,
}

/// A level with inheritance applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    name: String,
    discovery: Option<BTreeMap<String, OptionBag>>,
    tool: BTreeMap<String, OptionBag>,
    reporting: BTreeMap<String, OptionBag>,
}

impl Level {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enabled discovery plugins; `None` means all installed ones.
    pub fn enabled_discovery(&self) -> Option<BTreeSet<String>> {
        self.discovery.as_ref().map(enabled)
    }

    pub fn enabled_tools(&self) -> BTreeSet<String> {
        enabled(&self.tool)
    }

    pub fn enabled_reporting(&self) -> BTreeSet<String> {
        enabled(&self.reporting)
    }

    /// Level-specific options of a plugin.
    pub fn options_for(&self, kind: PluginKind, name: &str) -> Option<&OptionBag> {
        match kind {
            PluginKind::Discovery => self.discovery.as_ref().and_then(|d| d.get(name)),
            PluginKind::Tool => self.tool.get(name),
            PluginKind::Reporting => self.reporting.get(name),
        }
    }
}

fn enabled(entries: &BTreeMap<String, OptionBag>) -> BTreeSet<String> {
    entries
        .iter()
        .filter(|(_, bag)| bag.get(ENABLED_KEY).and_then(|v| v.as_bool()) != Some(false))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Overlay `child` entries onto `parent`, replacing whole plugin entries.
fn inherit(
    parent: Option<BTreeMap<String, OptionBag>>,
    child: Option<BTreeMap<String, OptionBag>>,
) -> Option<BTreeMap<String, OptionBag>> {
    match (parent, child) {
        (Some(mut parent), Some(child)) => {
            parent.extend(child);
            Some(parent)
        }
        (parent, None) => parent,
        (None, child) => child,
    }
}

/// Copy every key of `overlay` into `base`.
fn layer_bag(base: &mut OptionBag, overlay: &OptionBag) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}

/// Settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Run exactly these tools instead of the level's.
    pub forced_tools: Option<Vec<String>>,
    /// `--tool-option` values keyed by plugin name.
    pub plugin_options: BTreeMap<String, OptionBag>,
}

impl ConfigOverrides {
    /// Parse one `plugin.key=value` override.
    ///
    /// The value is read as a TOML value when possible (`5`, `true`,
    /// `["a"]`) and kept as a plain string otherwise.
    pub fn parse_option(&mut self, spec: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidOverride(spec.to_string());

        let (target, raw) = spec.split_once('=').ok_or_else(invalid)?;
        let (plugin, key) = target.split_once('.').ok_or_else(invalid)?;
        let (plugin, key) = (plugin.trim(), key.trim());
        if plugin.is_empty() || key.is_empty() {
            return Err(invalid());
        }

        let value = toml::from_str::<toml::Table>(&format!("value = {}", raw))
            .ok()
            .and_then(|mut table| table.remove("value"))
            .unwrap_or_else(|| toml::Value::String(raw.to_string()));

        self.plugin_options
            .entry(plugin.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }
}

impl Config {
    /// The configuration shipped with the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        toml::from_str(BUILTIN_CONFIG).map_err(ConfigError::Builtin)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Built-in defaults layered with a user file.
    ///
    /// Uses `explicit` when given, otherwise `.checkwright.toml` in the
    /// working directory if present.
    pub fn load_layered(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::builtin()?;

        let user_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(CONFIG_FILE_NAME)).filter(|p| p.exists()),
        };

        if let Some(path) = user_path {
            debug!("Loading configuration from {}", path.display());
            config.layer(Self::load(&path)?);
        }

        Ok(config)
    }

    /// Layer `other` on top of this configuration.
    ///
    /// Plugin options merge per key; levels are replaced whole.
    pub fn layer(&mut self, other: Config) {
        self.general.layer(other.general);

        for (plugin, bag) in other.plugins {
            layer_bag(self.plugins.entry(plugin).or_default(), &bag);
        }

        self.levels.extend(other.levels);
    }

    /// Resolve a level, applying `inherits_from` chains.
    pub fn level(&self, name: &str) -> Result<Level, ConfigError> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = Some(name.to_string());

        while let Some(level_name) = current {
            if chain.contains(&level_name) {
                chain.push(level_name);
                return Err(ConfigError::InheritanceCycle(chain));
            }
            let level = self
                .levels
                .get(&level_name)
                .ok_or_else(|| ConfigError::UnknownLevel(level_name.clone()))?;
            current = level.inherits_from.clone();
            chain.push(level_name);
        }

        let mut discovery = None;
        let mut tool = None;
        let mut reporting = None;

        // Root ancestor first, so children override their parents
        for level_name in chain.iter().rev() {
            if let Some(level) = self.levels.get(level_name) {
                discovery = inherit(discovery, level.discovery.clone());
                tool = inherit(tool, level.tool.clone());
                reporting = inherit(reporting, level.reporting.clone());
            }
        }

        Ok(Level {
            name: name.to_string(),
            discovery,
            tool: tool.unwrap_or_default(),
            reporting: reporting.unwrap_or_default(),
        })
    }

    /// Effective options of one plugin: plugin defaults, then level
    /// options, then command line overrides.
    pub fn plugin_options(
        &self,
        level: &Level,
        kind: PluginKind,
        name: &str,
        overrides: &ConfigOverrides,
    ) -> OptionBag {
        let mut options = self.plugins.get(name).cloned().unwrap_or_default();

        if let Some(level_options) = level.options_for(kind, name) {
            layer_bag(&mut options, level_options);
            options.remove(ENABLED_KEY);
        }
        if let Some(cli_options) = overrides.plugin_options.get(name) {
            layer_bag(&mut options, cli_options);
        }

        options
    }

    /// Generate the default configuration file content.
    pub fn default_toml() -> Result<String, ConfigError> {
        let config = Self::builtin()?;
        Ok(toml::to_string_pretty(&config)?)
    }
}
