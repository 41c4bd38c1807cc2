use super::{compile, display_path, path_args, run_tool};
use crate::models::{Facts, Issue, Package, Severity};
use crate::plugins::{Plugin, PluginContext, PluginError, ToolPlugin};
use async_trait::async_trait;
use regex::Regex;

const MSG_TEMPLATE: &str = "{abspath}:{line}: [{test_id}][{severity}]: {msg}";

/// Runs bandit security checks over discovered Python sources.
pub struct BanditToolPlugin {
    pattern: Regex,
}

impl BanditToolPlugin {
    pub fn new() -> Result<Self, PluginError> {
        Ok(Self {
            pattern: compile(r"^(.+?):(\d+): \[([A-Z]\d+)\]\[(\w+)\]: (.*)$")?,
        })
    }

    fn parse_output(&self, package: &Package, output: &str) -> Vec<Issue> {
        output
            .lines()
            .filter_map(|line| self.pattern.captures(line))
            .map(|caps| {
                Issue::new(
                    display_path(package, &caps[1]),
                    caps[2].parse().unwrap_or(0),
                    self.name(),
                    &caps[3],
                    Severity::from_label(&caps[4]),
                    &caps[5],
                )
            })
            .collect()
    }
}

impl Plugin for BanditToolPlugin {
    fn name(&self) -> &str {
        "bandit"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["python".to_string()]
    }

    fn required_command(&self) -> Option<&str> {
        Some("bandit")
    }
}

#[async_trait]
impl ToolPlugin for BanditToolPlugin {
    async fn scan(
        &self,
        package: &Package,
        facts: &Facts,
        ctx: &PluginContext,
    ) -> Result<Vec<Issue>, PluginError> {
        let sources = facts.get("python_src");
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec![
            "-q".to_string(),
            "-f".to_string(),
            "custom".to_string(),
            "--msg-template".to_string(),
            MSG_TEMPLATE.to_string(),
        ];
        args.extend(ctx.flags());
        args.extend(path_args(sources));

        let output = run_tool(self.name(), "bandit", &args, package, ctx, |code| code <= 1).await?;
        Ok(self.parse_output(package, &output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        let plugin = BanditToolPlugin::new().unwrap();
        let package = Package::new("pkg", "/work/pkg");
        let output = "\
/work/pkg/tools/run.py:12: [B602][HIGH]: subprocess call with shell=True identified
/work/pkg/tools/run.py:3: [B404][LOW]: Consider possible security implications
Run started:2024-01-01";

        let issues = plugin.parse_output(&package, output);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].file_path, "tools/run.py");
        assert_eq!(issues[0].line, 12);
        assert_eq!(issues[0].category, "B602");
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[1].severity, Severity::Low);
    }
}
