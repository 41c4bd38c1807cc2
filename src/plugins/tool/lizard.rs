use super::{compile, display_path, run_tool};
use crate::models::{Facts, Issue, Package, Severity};
use crate::plugins::{Plugin, PluginContext, PluginError, ToolPlugin};
use async_trait::async_trait;
use regex::Regex;

/// Runs lizard complexity analysis over the whole package.
pub struct LizardToolPlugin {
    pattern: Regex,
}

impl LizardToolPlugin {
    pub fn new() -> Result<Self, PluginError> {
        Ok(Self {
            pattern: compile(r"^(.+):(\d+):\s(.+):\s(.+)$")?,
        })
    }

    fn parse_output(&self, package: &Package, output: &str) -> Vec<Issue> {
        let mut issues = Vec::new();

        for caps in output.lines().filter_map(|line| self.pattern.captures(line)) {
            let issue = Issue::new(
                display_path(package, &caps[1]),
                caps[2].parse().unwrap_or(0),
                self.name(),
                &caps[3],
                Severity::High,
                &caps[4],
            );
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }

        issues
    }
}

impl Plugin for LizardToolPlugin {
    fn name(&self) -> &str {
        "lizard"
    }

    fn required_command(&self) -> Option<&str> {
        Some("lizard")
    }
}

#[async_trait]
impl ToolPlugin for LizardToolPlugin {
    async fn scan(
        &self,
        package: &Package,
        _facts: &Facts,
        ctx: &PluginContext,
    ) -> Result<Vec<Issue>, PluginError> {
        let mut args = vec![package.path().display().to_string()];
        let flags = ctx.flags();
        if !flags.iter().any(|f| f == "-w" || f == "--warnings_only") {
            args.push("-w".to_string());
        }
        args.extend(flags);
        for dir in &ctx.exclude_dirs {
            args.push("-x".to_string());
            args.push(format!("*/{}/*", dir));
        }

        let output = run_tool(self.name(), "lizard", &args, package, ctx, |code| code <= 1).await?;
        Ok(self.parse_output(package, &output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_dedups() {
        let plugin = LizardToolPlugin::new().unwrap();
        let package = Package::new("pkg", "/work/pkg");
        let output = "\
/work/pkg/src/parse.c:10: warning: parse_all has 120 NLOC, 31 CCN, 700 token, 2 PARAM, 140 length
/work/pkg/src/parse.c:10: warning: parse_all has 120 NLOC, 31 CCN, 700 token, 2 PARAM, 140 length
================================================";

        let issues = plugin.parse_output(&package, output);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file_path, "src/parse.c");
        assert_eq!(issues[0].line, 10);
        assert_eq!(issues[0].category, "warning");
        assert_eq!(issues[0].severity, Severity::High);
        assert!(issues[0].message.starts_with("parse_all has 120 NLOC"));
    }
}
