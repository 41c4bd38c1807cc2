//! Issue aggregation and statistics.
//!
//! Reporting plugins receive issues keyed by tool. These helpers flatten,
//! deduplicate, group and rank them for presentation.

use crate::models::{Issue, IssueMap};
use std::collections::{BTreeMap, BTreeSet};

/// Every issue of the map, in tool order.
pub fn flatten(issues: &IssueMap) -> Vec<&Issue> {
    issues.values().flatten().collect()
}

/// Issues of one tool with duplicates removed, in the order the tool
/// reported them.
pub fn unique_issues(issues: &[Issue]) -> Vec<&Issue> {
    let mut seen = BTreeSet::new();
    issues
        .iter()
        .filter(|issue| {
            seen.insert((
                issue.file_path.as_str(),
                issue.line,
                issue.category.as_str(),
                issue.message.as_str(),
            ))
        })
        .collect()
}

/// Number of unique issues across every tool.
pub fn unique_count(issues: &IssueMap) -> usize {
    issues.values().map(|list| unique_issues(list).len()).sum()
}

/// Group issues by file path, each group sorted by line.
pub fn group_by_file<'a>(issues: &[&'a Issue]) -> BTreeMap<String, Vec<&'a Issue>> {
    let mut grouped: BTreeMap<String, Vec<&Issue>> = BTreeMap::new();

    for issue in issues {
        grouped
            .entry(issue.file_path.clone())
            .or_default()
            .push(*issue);
    }

    // Sort issues within each file by line number
    for issues in grouped.values_mut() {
        issues.sort_by_key(|i| i.line);
    }

    grouped
}

/// Identify the most problematic files (by issue count).
pub fn most_problematic_files(issues: &IssueMap, n: usize) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for issue in flatten(issues) {
        *counts.entry(issue.file_path.as_str()).or_default() += 1;
    }

    let mut files: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(path, count)| (path.to_string(), count))
        .collect();

    files.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    files.truncate(n);

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    fn create_test_issue(file: &str, line: usize, severity: Severity) -> Issue {
        Issue::new(file, line, "pylint", "C0114", severity, "Test issue")
    }

    fn sample_map() -> IssueMap {
        let mut issues = IssueMap::new();
        issues.insert(
            "pylint".to_string(),
            vec![
                create_test_issue("b.py", 9, Severity::Low),
                create_test_issue("a.py", 3, Severity::Medium),
                create_test_issue("b.py", 9, Severity::Low),
                create_test_issue("b.py", 2, Severity::Critical),
            ],
        );
        issues.insert("lizard".to_string(), Vec::new());
        issues
    }

    #[test]
    fn test_unique_issues_keep_reported_order() {
        let map = sample_map();
        let unique = unique_issues(&map["pylint"]);

        assert_eq!(unique.len(), 3);
        assert_eq!((unique[0].file_path.as_str(), unique[0].line), ("b.py", 9));
        assert_eq!(unique[1].file_path, "a.py");
        assert_eq!((unique[2].file_path.as_str(), unique[2].line), ("b.py", 2));
        assert_eq!(unique_count(&map), 3);
    }

    #[test]
    fn test_group_by_file() {
        let map = sample_map();
        let grouped = group_by_file(&flatten(&map));

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["b.py"][0].line, 2);
        assert_eq!(grouped["a.py"].len(), 1);
    }

    #[test]
    fn test_most_problematic_files() {
        let files = most_problematic_files(&sample_map(), 1);
        assert_eq!(files, vec![("b.py".to_string(), 3)]);
    }
}
