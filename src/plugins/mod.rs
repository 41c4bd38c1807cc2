//! Plugin capabilities.
//!
//! Every plugin has a name, a list of dependency names and optionally an
//! external command it needs. On top of that it implements exactly one of
//! the three capabilities: discovery, tool or reporting.

pub mod discovery;
pub mod process;
pub mod registry;
pub mod reporting;
pub mod tool;

pub use registry::PluginRegistry;

use crate::config::OptionBag;
use crate::models::{Facts, Issue, IssueMap, Package};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The three plugin categories, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginKind {
    Discovery,
    Tool,
    Reporting,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Discovery => write!(f, "discovery"),
            PluginKind::Tool => write!(f, "tool"),
            PluginKind::Reporting => write!(f, "reporting"),
        }
    }
}

/// Failure of a single plugin invocation.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("required command {0} was not found on PATH")]
    CommandNotFound(String),

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{command} exited with status {}", .code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    ExitStatus {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Read-only view handed to a plugin for one invocation.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Per-run working directory for logs and reports.
    pub output_dir: PathBuf,
    /// Effective option bag after configuration layering.
    pub options: OptionBag,
    /// Time budget for this invocation.
    pub timeout: Duration,
    /// Directory names skipped when walking the package.
    pub exclude_dirs: Vec<String>,
    /// Echo raw tool output to stdout.
    pub show_tool_output: bool,
}

impl PluginContext {
    /// A string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// A list option; a single string counts as a one-element list.
    pub fn option_list(&self, key: &str) -> Vec<String> {
        match self.options.get(key) {
            Some(toml::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(toml::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Extra command line flags from the `flags` option.
    ///
    /// Accepts either a whitespace separated string or an array.
    pub fn flags(&self) -> Vec<String> {
        match self.options.get("flags") {
            Some(toml::Value::String(s)) => s.split_whitespace().map(String::from).collect(),
            Some(toml::Value::Array(_)) => self.option_list("flags"),
            _ => Vec::new(),
        }
    }

    /// Write a plugin log file into the run directory.
    pub fn write_log(&self, name: &str, content: &str) -> Result<PathBuf, PluginError> {
        let path = self.output_dir.join(format!("{}.log", name));
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

/// Identity shared by every plugin kind.
pub trait Plugin: Send + Sync {
    /// Unique name within the plugin's kind.
    fn name(&self) -> &str;

    /// Names of plugins that must run before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// External command the plugin shells out to, if any.
    fn required_command(&self) -> Option<&str> {
        None
    }

    /// Whether the required command is on `PATH`.
    fn command_exists(&self) -> bool {
        self.required_command()
            .map_or(true, |cmd| which::which(cmd).is_ok())
    }
}

/// Inspects a package and reports facts for tool plugins.
#[async_trait]
pub trait DiscoveryPlugin: Plugin {
    async fn scan(&self, package: &Package, ctx: &PluginContext) -> Result<Facts, PluginError>;
}

/// Wraps one external analysis command.
#[async_trait]
pub trait ToolPlugin: Plugin {
    async fn scan(
        &self,
        package: &Package,
        facts: &Facts,
        ctx: &PluginContext,
    ) -> Result<Vec<Issue>, PluginError>;
}

/// Renders the aggregated issues.
#[async_trait]
pub trait ReportingPlugin: Plugin {
    async fn report(
        &self,
        package: &Package,
        issues: &IssueMap,
        level: &str,
        ctx: &PluginContext,
    ) -> Result<(), PluginError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(options: &str) -> PluginContext {
        PluginContext {
            output_dir: std::env::temp_dir(),
            options: toml::from_str(options).unwrap(),
            timeout: Duration::from_secs(5),
            exclude_dirs: Vec::new(),
            show_tool_output: false,
        }
    }

    #[test]
    fn test_flags_from_string() {
        let ctx = context_with(r#"flags = "--disable=C0114  -j 2""#);
        assert_eq!(ctx.flags(), vec!["--disable=C0114", "-j", "2"]);
    }

    #[test]
    fn test_flags_from_array() {
        let ctx = context_with(r#"flags = ["-C", "15"]"#);
        assert_eq!(ctx.flags(), vec!["-C", "15"]);
    }

    #[test]
    fn test_missing_options() {
        let ctx = context_with("");
        assert!(ctx.flags().is_empty());
        assert!(ctx.option_str("anything").is_none());
        assert!(ctx.option_list("anything").is_empty());
    }

    struct NoCommand;

    impl Plugin for NoCommand {
        fn name(&self) -> &str {
            "no_command"
        }
    }

    struct MissingCommand;

    impl Plugin for MissingCommand {
        fn name(&self) -> &str {
            "missing_command"
        }

        fn required_command(&self) -> Option<&str> {
            Some("checkwright-surely-not-installed")
        }
    }

    #[test]
    fn test_command_exists() {
        assert!(NoCommand.command_exists());
        assert!(!MissingCommand.command_exists());
        assert_eq!(PluginKind::Reporting.to_string(), "reporting");
    }
}
