//! Error types for the orchestration engine.
//!
//! `OrchestratorError` covers everything that can end a package run.
//! Only `ToolInvocation` (and load failures of discovery plugins) are
//! recovered inside the engine; every other variant is fatal for the
//! package being processed.

use crate::plugins::PluginKind;
use crate::profile::ProfileLoadError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration could not be loaded: {0}")]
    ConfigLoad(String),

    #[error("Profile could not be loaded: {0}")]
    ProfileLoad(#[from] ProfileLoadError),

    #[error("No level configured for package {0} (no package entry and no default)")]
    NoLevel(String),

    #[error("Level {0} is not defined in the configuration")]
    InvalidLevel(String),

    #[error("{kind} plugin {name} is not installed")]
    PluginNotFound { kind: PluginKind, name: String },

    #[error("{kind} plugin {name} failed to load: {reason}")]
    PluginLoad {
        kind: PluginKind,
        name: String,
        reason: String,
    },

    #[error("Plugin {plugin} depends on {dependency}, which is not enabled for this run")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Dependency cycle between plugins: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Package path does not exist: {}", .0.display())]
    MissingPackage(PathBuf),

    #[error("Output directory {} is unusable: {source}", .path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool {tool} failed: {reason}")]
    ToolInvocation { tool: String, reason: String },

    #[error("No reporting plugins are configured for level {0}")]
    NoReportingPlugin(String),

    #[error("Reporting plugin {plugin} failed: {reason}")]
    ReportingFailed { plugin: String, reason: String },

    #[error("Run cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Whether this error aborts the package run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OrchestratorError::ToolInvocation { .. })
    }
}
