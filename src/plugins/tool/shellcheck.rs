use super::{compile, display_path, path_args, run_tool};
use crate::models::{Facts, Issue, Package, Severity};
use crate::plugins::{Plugin, PluginContext, PluginError, ToolPlugin};
use async_trait::async_trait;
use regex::Regex;

/// Runs shellcheck over discovered shell scripts.
pub struct ShellcheckToolPlugin {
    pattern: Regex,
}

impl ShellcheckToolPlugin {
    pub fn new() -> Result<Self, PluginError> {
        Ok(Self {
            pattern: compile(r"^(.+?):(\d+):(\d+): (\w+): (.*?) \[(SC\d+)\]$")?,
        })
    }

    fn parse_output(&self, package: &Package, output: &str) -> Vec<Issue> {
        output
            .lines()
            .filter_map(|line| self.pattern.captures(line))
            .map(|caps| {
                let code = &caps[6];
                Issue::new(
                    display_path(package, &caps[1]),
                    caps[2].parse().unwrap_or(0),
                    self.name(),
                    code,
                    Severity::from_label(&caps[4]),
                    &caps[5],
                )
                .with_reference(format!("https://www.shellcheck.net/wiki/{}", code))
            })
            .collect()
    }
}

impl Plugin for ShellcheckToolPlugin {
    fn name(&self) -> &str {
        "shellcheck"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["shell".to_string()]
    }

    fn required_command(&self) -> Option<&str> {
        Some("shellcheck")
    }
}

#[async_trait]
impl ToolPlugin for ShellcheckToolPlugin {
    async fn scan(
        &self,
        package: &Package,
        facts: &Facts,
        ctx: &PluginContext,
    ) -> Result<Vec<Issue>, PluginError> {
        let scripts = facts.get("shell_src");
        if scripts.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["-f".to_string(), "gcc".to_string()];
        args.extend(ctx.flags());
        args.extend(path_args(scripts));

        let output =
            run_tool(self.name(), "shellcheck", &args, package, ctx, |code| code <= 1).await?;
        Ok(self.parse_output(package, &output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        let plugin = ShellcheckToolPlugin::new().unwrap();
        let package = Package::new("pkg", "/work/pkg");
        let output = "\
/work/pkg/deploy.sh:4:6: warning: Quote this to prevent word splitting. [SC2046]
/work/pkg/deploy.sh:9:1: error: Couldn't parse this function. [SC1073]
/work/pkg/deploy.sh:2:1: note: Not following: ./env.sh [SC1091]";

        let issues = plugin.parse_output(&package, output);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].file_path, "deploy.sh");
        assert_eq!(issues[0].category, "SC2046");
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(issues[0].message, "Quote this to prevent word splitting.");
        assert_eq!(
            issues[0].reference.as_deref(),
            Some("https://www.shellcheck.net/wiki/SC2046")
        );
        assert_eq!(issues[1].severity, Severity::High);
        assert_eq!(issues[2].severity, Severity::Low);
    }
}
