//! Data models for the orchestrator.
//!
//! This module contains the core data structures shared by the engine and
//! the plugins: packages, discovered facts, issues and summaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Severity level of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - style issues, minor suggestions
    Low,
    /// Medium severity - code quality issues, potential bugs
    Medium,
    /// High severity - bugs, security concerns
    High,
    /// Critical severity - security vulnerabilities, major bugs
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }

    /// Map a tool's own severity label onto the shared scale.
    ///
    /// Unknown labels fall back to `Medium`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "info" | "note" | "style" | "convention" | "refactor" | "low" | "c" | "r" | "i" => {
                Severity::Low
            }
            "warning" | "medium" | "w" => Severity::Medium,
            "error" | "high" | "e" => Severity::High,
            "critical" | "fatal" | "f" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

/// A single normalized finding reported by a tool plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    /// Path of the file containing the issue.
    pub file_path: String,
    /// Line number of the issue (1-indexed, 0 when the tool gives none).
    pub line: usize,
    /// Name of the tool plugin that found the issue.
    pub tool: String,
    /// The tool's own issue type or rule identifier.
    pub category: String,
    /// Severity on the shared scale.
    pub severity: Severity,
    /// Human readable message.
    pub message: String,
    /// Optional cross reference (e.g. a CERT rule).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Issue {
    /// Creates an issue without a cross reference.
    pub fn new(
        file_path: impl Into<String>,
        line: usize,
        tool: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            tool: tool.into(),
            category: category.into(),
            severity,
            message: message.into(),
            reference: None,
        }
    }

    /// Attach a cross reference to the issue.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Issues keyed by the name of the tool plugin that produced them.
///
/// An empty list means the tool ran (or failed in isolation) and
/// contributed nothing.
pub type IssueMap = BTreeMap<String, Vec<Issue>>;

/// Summary of issues found during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSummary {
    /// Total number of issues.
    pub total: usize,
    /// Number of critical issues.
    pub critical: usize,
    /// Number of high severity issues.
    pub high: usize,
    /// Number of medium severity issues.
    pub medium: usize,
    /// Number of low severity issues.
    pub low: usize,
    /// Issues grouped by tool.
    pub by_tool: BTreeMap<String, usize>,
}

impl IssueSummary {
    /// Creates a summary from a list of issues.
    pub fn from_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let mut summary = Self::default();

        for issue in issues {
            summary.total += 1;
            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }

            *summary.by_tool.entry(issue.tool.clone()).or_insert(0) += 1;
        }

        summary
    }

    /// Creates a summary across every tool of an issue map.
    pub fn from_map(issues: &IssueMap) -> Self {
        Self::from_issues(issues.values().flatten())
    }
}

/// Name given to a package whose path has no final component.
const ROOT_PACKAGE_NAME: &str = "root";

/// One analysis target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    name: String,
    path: PathBuf,
}

impl Package {
    /// Create a package from an explicit name and path.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Create a package from an existing directory, naming it after the
    /// last component of the canonical path. A filesystem root is named
    /// `root` so the name never contains a separator.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let canonical = std::fs::canonicalize(path)?;
        let name = canonical
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ROOT_PACKAGE_NAME.to_string());

        Ok(Self::new(name, canonical))
    }

    /// Name used for profile and exception lookups.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root directory of the package.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Facts produced by discovery plugins, keyed by fact name
/// (e.g. `python_src`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facts {
    entries: BTreeMap<String, Vec<PathBuf>>,
}

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path under a fact key. Duplicate paths are ignored.
    pub fn insert(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) {
        let path = path.into();
        let paths = self.entries.entry(key.into()).or_default();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    /// Mark a fact as present even if it carries no paths.
    pub fn touch(&mut self, key: impl Into<String>) {
        self.entries.entry(key.into()).or_default();
    }

    /// Merge another set of facts into this one.
    pub fn merge(&mut self, other: Facts) {
        for (key, paths) in other.entries {
            self.touch(key.clone());
            for path in paths {
                self.insert(key.clone(), path);
            }
        }
    }

    /// Paths recorded under a key; empty when the fact is absent.
    pub fn get(&self, key: &str) -> &[PathBuf] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_emoji() {
        assert_eq!(Severity::Critical.emoji(), "🔴");
        assert_eq!(Severity::High.emoji(), "🟠");
        assert_eq!(Severity::Medium.emoji(), "🟡");
        assert_eq!(Severity::Low.emoji(), "🟢");
    }

    #[test]
    fn test_severity_from_label() {
        assert_eq!(Severity::from_label("error"), Severity::High);
        assert_eq!(Severity::from_label(" Warning "), Severity::Medium);
        assert_eq!(Severity::from_label("C"), Severity::Low);
        assert_eq!(Severity::from_label("fatal"), Severity::Critical);
        assert_eq!(Severity::from_label("whatever"), Severity::Medium);
    }

    #[test]
    fn test_issue_summary() {
        let mut issues = IssueMap::new();
        issues.insert(
            "bandit".to_string(),
            vec![
                Issue::new("a.py", 1, "bandit", "B101", Severity::Critical, "assert"),
                Issue::new("a.py", 2, "bandit", "B602", Severity::High, "shell"),
            ],
        );
        issues.insert(
            "pylint".to_string(),
            vec![Issue::new("a.py", 3, "pylint", "C0114", Severity::Low, "doc")],
        );
        issues.insert("lizard".to_string(), Vec::new());

        let summary = IssueSummary::from_map(&issues);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.by_tool.get("bandit"), Some(&2));
        assert_eq!(summary.by_tool.get("lizard"), None);
    }

    #[test]
    fn test_package_name_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("my_pkg");
        std::fs::create_dir(&pkg_dir).unwrap();

        let package = Package::from_path(&pkg_dir).unwrap();
        assert_eq!(package.name(), "my_pkg");
        assert!(package.path().is_absolute());
    }

    #[test]
    fn test_package_from_missing_path() {
        assert!(Package::from_path(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn test_root_package_name_has_no_separator() {
        let package = Package::from_path(Path::new("/")).unwrap();
        assert_eq!(package.name(), "root");
        assert_eq!(package.path(), Path::new("/"));

        let run_dir = Path::new("/tmp/out").join(format!("{}-default", package.name()));
        assert!(run_dir.starts_with("/tmp/out"));
    }

    #[test]
    fn test_facts_merge_dedups() {
        let mut facts = Facts::new();
        facts.insert("python_src", "a.py");

        let mut other = Facts::new();
        other.insert("python_src", "a.py");
        other.insert("python_src", "b.py");
        other.touch("cmake");

        facts.merge(other);
        assert_eq!(facts.get("python_src").len(), 2);
        assert!(facts.keys().any(|k| k == "cmake"));
        assert!(facts.get("cmake").is_empty());
        assert!(facts.get("missing").is_empty());
    }
}
