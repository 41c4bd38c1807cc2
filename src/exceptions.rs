//! Package and issue exceptions.
//!
//! An exceptions file lists packages to skip entirely and rules that drop
//! individual issues after the tool phase:
//!
//! ```toml
//! ignore_packages = ["vendored_*", "third_party"]
//!
//! [[file]]
//! tools = ["all"]
//! globs = ["*/generated/*"]
//!
//! [[message_regex]]
//! tools = ["pylint"]
//! regex = "too-many-.*"
//! ```

use crate::models::{IssueMap, Package};
use glob::Pattern;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Tool list entry that matches every tool.
const ALL_TOOLS: &str = "all";

#[derive(Error, Debug)]
pub enum ExceptionsError {
    #[error("Failed to read exceptions file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse exceptions: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid glob {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Invalid regex {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawExceptions {
    #[serde(default)]
    ignore_packages: Vec<String>,
    #[serde(default)]
    file: Vec<RawFileRule>,
    #[serde(default)]
    message_regex: Vec<RawMessageRule>,
}

#[derive(Debug, Deserialize)]
struct RawFileRule {
    tools: Vec<String>,
    globs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessageRule {
    tools: Vec<String>,
    regex: String,
}

#[derive(Debug)]
struct FileRule {
    tools: Vec<String>,
    globs: Vec<Pattern>,
}

#[derive(Debug)]
struct MessageRule {
    tools: Vec<String>,
    regex: Regex,
}

fn applies_to(tools: &[String], tool: &str) -> bool {
    tools.iter().any(|t| t == ALL_TOOLS || t == tool)
}

fn compile_glob(pattern: &str) -> Result<Pattern, ExceptionsError> {
    Pattern::new(pattern).map_err(|source| ExceptionsError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Compiled exceptions.
#[derive(Debug, Default)]
pub struct Exceptions {
    ignore_packages: Vec<Pattern>,
    file_rules: Vec<FileRule>,
    message_rules: Vec<MessageRule>,
}

impl Exceptions {
    pub fn load(path: &Path) -> Result<Self, ExceptionsError> {
        let content = std::fs::read_to_string(path).map_err(|source| ExceptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ExceptionsError> {
        let raw: RawExceptions = toml::from_str(content)?;

        let ignore_packages = raw
            .ignore_packages
            .iter()
            .map(|p| compile_glob(p))
            .collect::<Result<_, _>>()?;

        let file_rules = raw
            .file
            .into_iter()
            .map(|rule| {
                Ok(FileRule {
                    globs: rule
                        .globs
                        .iter()
                        .map(|g| compile_glob(g))
                        .collect::<Result<_, _>>()?,
                    tools: rule.tools,
                })
            })
            .collect::<Result<_, ExceptionsError>>()?;

        let message_rules = raw
            .message_regex
            .into_iter()
            .map(|rule| {
                let regex = Regex::new(&rule.regex).map_err(|source| ExceptionsError::Regex {
                    pattern: rule.regex.clone(),
                    source,
                })?;
                Ok(MessageRule {
                    tools: rule.tools,
                    regex,
                })
            })
            .collect::<Result<_, ExceptionsError>>()?;

        Ok(Self {
            ignore_packages,
            file_rules,
            message_rules,
        })
    }

    /// Whether a package is skipped entirely.
    pub fn is_ignored(&self, package: &str) -> bool {
        self.ignore_packages.iter().any(|p| p.matches(package))
    }

    /// Drop issues matched by a file or message rule.
    ///
    /// File globs are tried against the path as reported and against the
    /// path joined to the package root. Tools keep their entry even when
    /// every issue is dropped.
    pub fn filter_issues(&self, package: &Package, issues: IssueMap) -> IssueMap {
        if self.file_rules.is_empty() && self.message_rules.is_empty() {
            return issues;
        }

        issues
            .into_iter()
            .map(|(tool, list)| {
                let before = list.len();
                let kept: Vec<_> = list
                    .into_iter()
                    .filter(|issue| {
                        let absolute = package.path().join(&issue.file_path);
                        let file_hit = self.file_rules.iter().any(|rule| {
                            applies_to(&rule.tools, &tool)
                                && rule.globs.iter().any(|g| {
                                    g.matches(&issue.file_path) || g.matches_path(&absolute)
                                })
                        });
                        let message_hit = self.message_rules.iter().any(|rule| {
                            applies_to(&rule.tools, &tool) && rule.regex.is_match(&issue.message)
                        });
                        !(file_hit || message_hit)
                    })
                    .collect();

                if kept.len() != before {
                    debug!("Exceptions removed {} {} issues", before - kept.len(), tool);
                }
                (tool, kept)
            })
            .collect()
    }
}

/// Whether a package is skipped; no exceptions means nothing is.
pub fn is_ignored(package: &str, exceptions: Option<&Exceptions>) -> bool {
    exceptions.is_some_and(|e| e.is_ignored(package))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Issue, Severity};

    const SAMPLE: &str = r#"
ignore_packages = ["vendored_*", "legacy"]

[[file]]
tools = ["all"]
globs = ["*/generated/*"]

[[file]]
tools = ["pylint"]
globs = ["tests/*"]

[[message_regex]]
tools = ["bandit"]
regex = "^Consider possible"
"#;

    fn issue(tool: &str, file: &str, message: &str) -> Issue {
        Issue::new(file, 1, tool, "X1", Severity::Low, message)
    }

    #[test]
    fn test_package_ignores() {
        let exceptions = Exceptions::from_toml_str(SAMPLE).unwrap();
        assert!(exceptions.is_ignored("legacy"));
        assert!(exceptions.is_ignored("vendored_zlib"));
        assert!(!exceptions.is_ignored("app"));

        assert!(is_ignored("legacy", Some(&exceptions)));
        assert!(!is_ignored("legacy", None));
    }

    #[test]
    fn test_filter_issues() {
        let exceptions = Exceptions::from_toml_str(SAMPLE).unwrap();
        let package = Package::new("app", "/work/app");

        let mut issues = IssueMap::new();
        issues.insert(
            "pylint".to_string(),
            vec![
                issue("pylint", "src/generated/api.py", "a"),
                issue("pylint", "tests/test_api.py", "b"),
                issue("pylint", "src/api.py", "c"),
            ],
        );
        issues.insert(
            "bandit".to_string(),
            vec![
                issue("bandit", "tests/test_api.py", "Consider possible security implications"),
                issue("bandit", "tests/test_api.py", "Use of assert detected"),
            ],
        );

        let filtered = exceptions.filter_issues(&package, issues);
        assert_eq!(filtered["pylint"].len(), 1);
        assert_eq!(filtered["pylint"][0].file_path, "src/api.py");
        assert_eq!(filtered["bandit"].len(), 1);
        assert_eq!(filtered["bandit"][0].message, "Use of assert detected");
    }

    #[test]
    fn test_empty_exceptions_keep_everything() {
        let exceptions = Exceptions::from_toml_str("").unwrap();
        let package = Package::new("app", "/work/app");
        let mut issues = IssueMap::new();
        issues.insert("lizard".to_string(), vec![issue("lizard", "a.c", "x")]);

        assert!(!exceptions.is_ignored("app"));
        assert_eq!(exceptions.filter_issues(&package, issues.clone()), issues);
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            Exceptions::from_toml_str("ignore_packages = [\"[\"]"),
            Err(ExceptionsError::Pattern { .. })
        ));
        assert!(matches!(
            Exceptions::from_toml_str("[[message_regex]]\ntools = [\"all\"]\nregex = \"(\"\n"),
            Err(ExceptionsError::Regex { .. })
        ));
        assert!(matches!(
            Exceptions::from_toml_str("ignore_packages = 3"),
            Err(ExceptionsError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Exceptions::load(&dir.path().join("nope.toml")),
            Err(ExceptionsError::Io { .. })
        ));
    }
}
