use super::{compile, display_path, path_args, run_tool};
use crate::models::{Facts, Issue, Package, Severity};
use crate::plugins::{Plugin, PluginContext, PluginError, ToolPlugin};
use async_trait::async_trait;
use regex::Regex;

/// Runs pylint over discovered Python sources.
pub struct PylintToolPlugin {
    pattern: Regex,
}

impl PylintToolPlugin {
    pub fn new() -> Result<Self, PluginError> {
        Ok(Self {
            // src/app.py:3: [C0114(missing-module-docstring), ] Missing module docstring
            pattern: compile(r"^(.+?):(\d+): \[([A-Z])(\d+)\(([^)]*)\),\s*([^\]]*)\]\s*(.*)$")?,
        })
    }

    fn parse_output(&self, package: &Package, output: &str) -> Vec<Issue> {
        let mut issues = Vec::new();

        for line in output.lines() {
            let Some(caps) = self.pattern.captures(line) else {
                continue;
            };

            let letter = &caps[3];
            let code = format!("{}{}", letter, &caps[4]);
            let symbol = &caps[5];
            let object = caps[6].trim();
            let message = if object.is_empty() {
                caps[7].to_string()
            } else {
                format!("{}: {}", object, &caps[7])
            };

            let issue = Issue::new(
                display_path(package, &caps[1]),
                caps[2].parse().unwrap_or(0),
                self.name(),
                format!("{}({})", code, symbol),
                Severity::from_label(letter),
                message,
            );
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }

        issues
    }
}

impl Plugin for PylintToolPlugin {
    fn name(&self) -> &str {
        "pylint"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["python".to_string()]
    }

    fn required_command(&self) -> Option<&str> {
        Some("pylint")
    }
}

#[async_trait]
impl ToolPlugin for PylintToolPlugin {
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
            "--output-format=parseable".to_string(),
            "--reports=no".to_string(),
        ];
        if let Some(rcfile) = ctx.option_str("rcfile") {
            args.push(format!("--rcfile={}", rcfile));
        }
        args.extend(ctx.flags());
        args.extend(path_args(sources));

        // pylint's exit status is a bit mask of message categories; 32 is a usage error
        let output = run_tool(self.name(), "pylint", &args, package, ctx, |code| code < 32).await?;
        Ok(self.parse_output(package, &output.stdout))
    }
}
