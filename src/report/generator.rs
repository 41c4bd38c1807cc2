//! Report rendering.
//!
//! Turns the aggregated issue map of a run into console text, Markdown
//! or JSON. Reporting plugins decide where the rendered output goes.

use crate::analysis::{flatten, group_by_file, most_problematic_files, unique_count, unique_issues};
use crate::models::{Issue, IssueMap, IssueSummary, Package, Severity};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Metadata about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Package name.
    pub package: String,
    /// Package root.
    pub path: String,
    /// Level the package was analyzed at.
    pub level: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Tool plugins that contributed an entry (possibly empty).
    pub tools: Vec<String>,
    /// Total unique issues.
    pub total_issues: usize,
}

/// The complete report of one package run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: IssueSummary,
    pub issues: IssueMap,
}

impl Report {
    /// Build a report for `package` analyzed at `level`.
    pub fn new(package: &Package, level: &str, issues: &IssueMap) -> Self {
        Self {
            metadata: ReportMetadata {
                package: package.name().to_string(),
                path: package.path().display().to_string(),
                level: level.to_string(),
                generated_at: Utc::now(),
                tools: issues.keys().cloned().collect(),
                total_issues: unique_count(issues),
            },
            summary: IssueSummary::from_map(issues),
            issues: issues.clone(),
        }
    }
}

/// Render one issue as a console line.
pub fn format_console_issue(issue: &Issue) -> String {
    match &issue.reference {
        Some(reference) => format!(
            "  {}:{}: {}:{}: {} ({}) [{}]",
            issue.file_path,
            issue.line,
            issue.tool,
            issue.category,
            issue.message,
            reference,
            issue.severity
        ),
        None => format!(
            "  {}:{}: {}:{}: {} [{}]",
            issue.file_path, issue.line, issue.tool, issue.category, issue.message, issue.severity
        ),
    }
}

/// Render the console report: unique issues per tool and a total.
pub fn generate_console_report(issues: &IssueMap) -> String {
    let mut lines = Vec::new();
    let mut total = 0;

    for (tool, list) in issues {
        let unique = unique_issues(list);
        lines.push(format!("Tool {}: {} unique issues", tool, unique.len()));
        lines.extend(unique.iter().map(|issue| format_console_issue(issue)));
        total += unique.len();
    }

    lines.push(format!("{} total unique issues", total));
    lines.join("\n")
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Checkwright Report: {}\n\n", report.metadata.package));
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.summary, &report.issues));
    output.push_str(&generate_issues_section(&report.issues));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Package:** {}\n", metadata.package));
    section.push_str(&format!("- **Path:** `{}`\n", metadata.path));
    section.push_str(&format!("- **Level:** {}\n", metadata.level));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if !metadata.tools.is_empty() {
        section.push_str(&format!("- **Tools:** {}\n", metadata.tools.join(", ")));
    }
    section.push_str(&format!("- **Total Issues:** {}\n", metadata.total_issues));
    section.push('\n');

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &IssueSummary, issues: &IssueMap) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    // Severity breakdown
    section.push_str("### Issue Severity Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.high, summary.medium, summary.low, summary.total
    ));

    if !issues.is_empty() {
        section.push_str("### Issues by Tool\n\n");
        section.push_str("| Tool | Count |\n");
        section.push_str("|:---|:---:|\n");

        for tool in issues.keys() {
            let count = summary.by_tool.get(tool).copied().unwrap_or(0);
            section.push_str(&format!("| {} | {} |\n", tool, count));
        }
        section.push('\n');
    }

    let problematic = most_problematic_files(issues, 5);
    if !problematic.is_empty() {
        section.push_str("### Most Problematic Files\n\n");
        section.push_str("| File | Issues |\n");
        section.push_str("|:---|:---:|\n");

        for (file, count) in problematic {
            section.push_str(&format!("| `{}` | {} |\n", file, count));
        }
        section.push('\n');
    }

    section
}

/// Generate the issues section.
fn generate_issues_section(issues: &IssueMap) -> String {
    let mut section = String::new();

    section.push_str("## Issues by File\n\n");

    let all = flatten(issues);
    if all.is_empty() {
        section.push_str("No issues were found. 🎉\n\n");
        return section;
    }

    for (file, mut file_issues) in group_by_file(&all) {
        section.push_str(&format!("### `{}`\n\n", file));

        file_issues.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.line.cmp(&b.line)));
        for issue in file_issues {
            section.push_str(&generate_issue_line(issue));
        }
        section.push('\n');
    }

    section
}

/// Generate a single issue entry.
fn generate_issue_line(issue: &Issue) -> String {
    let mut line = format!(
        "- {} **{}** line {}: `{}:{}` {}",
        issue.severity.emoji(),
        issue.severity.to_string().to_uppercase(),
        issue.line,
        issue.tool,
        issue.category,
        issue.message
    );
    if let Some(reference) = &issue.reference {
        line.push_str(&format!(" ([{}]({}))", issue.category, reference));
    }
    line.push('\n');
    line
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by Checkwright*\n".to_string()
}

/// Write the Markdown report to a file.
pub fn write_markdown_report(report: &Report, path: &Path) -> Result<()> {
    let content = generate_markdown_report(report);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(report: &Report, path: &Path) -> Result<()> {
    let content = generate_json_report(report)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_issues() -> IssueMap {
        let mut issues = IssueMap::new();
        issues.insert(
            "shellcheck".to_string(),
            vec![
                Issue::new("deploy.sh", 4, "shellcheck", "SC2046", Severity::Medium, "Quote this")
                    .with_reference("https://www.shellcheck.net/wiki/SC2046"),
                Issue::new("deploy.sh", 4, "shellcheck", "SC2046", Severity::Medium, "Quote this")
                    .with_reference("https://www.shellcheck.net/wiki/SC2046"),
            ],
        );
        issues.insert(
            "pylint".to_string(),
            vec![Issue::new("app.py", 1, "pylint", "C0114", Severity::Low, "Missing docstring")],
        );
        issues.insert("lizard".to_string(), Vec::new());
        issues
    }

    #[test]
    fn test_console_report() {
        let text = generate_console_report(&sample_issues());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines,
            vec![
                "Tool lizard: 0 unique issues",
                "Tool pylint: 1 unique issues",
                "  app.py:1: pylint:C0114: Missing docstring [Low]",
                "Tool shellcheck: 1 unique issues",
                "  deploy.sh:4: shellcheck:SC2046: Quote this (https://www.shellcheck.net/wiki/SC2046) [Medium]",
                "2 total unique issues",
            ]
        );
    }

    #[test]
    fn test_console_report_empty() {
        assert_eq!(generate_console_report(&IssueMap::new()), "0 total unique issues");
    }

    #[test]
    fn test_console_report_keeps_tool_order() {
        let mut issues = IssueMap::new();
        issues.insert(
            "pylint".to_string(),
            vec![
                Issue::new("z.py", 9, "pylint", "W0611", Severity::Low, "Unused import"),
                Issue::new("a.py", 1, "pylint", "C0114", Severity::Low, "Missing docstring"),
                Issue::new("z.py", 9, "pylint", "W0611", Severity::Low, "Unused import"),
            ],
        );

        let text = generate_console_report(&issues);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Tool pylint: 2 unique issues",
                "  z.py:9: pylint:W0611: Unused import [Low]",
                "  a.py:1: pylint:C0114: Missing docstring [Low]",
                "2 total unique issues",
            ]
        );
    }

    #[test]
    fn test_generate_markdown_report() {
        let package = Package::new("demo", "/work/demo");
        let report = Report::new(&package, "default", &sample_issues());
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Checkwright Report: demo"));
        assert!(markdown.contains("- **Level:** default"));
        assert!(markdown.contains("## Issues by File"));
        assert!(markdown.contains("### `deploy.sh`"));
        assert!(markdown.contains("| lizard | 0 |"));
    }

    #[test]
    fn test_markdown_without_issues() {
        let package = Package::new("demo", "/work/demo");
        let report = Report::new(&package, "default", &IssueMap::new());
        assert!(generate_markdown_report(&report).contains("No issues were found"));
    }

    #[test]
    fn test_generate_json_report() {
        let package = Package::new("demo", "/work/demo");
        let report = Report::new(&package, "security", &sample_issues());
        assert_eq!(report.metadata.total_issues, 2);

        let json = generate_json_report(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metadata"]["level"], "security");
        assert_eq!(value["summary"]["total"], 3);
        assert!(value["issues"]["lizard"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let package = Package::new("demo", dir.path());
        let report = Report::new(&package, "default", &sample_issues());

        let json_path = dir.path().join("demo-default.json");
        write_json_report(&report, &json_path).unwrap();
        assert!(json_path.exists());

        let md_path = dir.path().join("demo-default.md");
        write_markdown_report(&report, &md_path).unwrap();
        assert!(std::fs::read_to_string(md_path).unwrap().contains("deploy.sh"));
    }
}
