//! Built-in reporting plugins.

use super::{Plugin, PluginContext, PluginError, ReportingPlugin};
use crate::models::{IssueMap, Package};
use crate::report::{generate_console_report, write_json_report, write_markdown_report, Report};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// `<run dir>/<package>-<level>.<extension>`
fn report_path(package: &Package, level: &str, ctx: &PluginContext, extension: &str) -> PathBuf {
    ctx.output_dir
        .join(format!("{}-{}.{}", package.name(), level, extension))
}

/// Prints unique issues per tool to stdout.
pub struct ConsoleReportingPlugin;

impl Plugin for ConsoleReportingPlugin {
    fn name(&self) -> &str {
        "print_to_console"
    }
}

#[async_trait]
impl ReportingPlugin for ConsoleReportingPlugin {
    async fn report(
        &self,
        _package: &Package,
        issues: &IssueMap,
        _level: &str,
        _ctx: &PluginContext,
    ) -> Result<(), PluginError> {
        println!("{}", generate_console_report(issues));
        Ok(())
    }
}

/// Writes a JSON report into the run directory.
pub struct JsonReportingPlugin;

impl Plugin for JsonReportingPlugin {
    fn name(&self) -> &str {
        "write_json"
    }
}

#[async_trait]
impl ReportingPlugin for JsonReportingPlugin {
    async fn report(
        &self,
        package: &Package,
        issues: &IssueMap,
        level: &str,
        ctx: &PluginContext,
    ) -> Result<(), PluginError> {
        let path = report_path(package, level, ctx, "json");
        let report = Report::new(package, level, issues);

        write_json_report(&report, &path).map_err(|e| PluginError::Other(format!("{:#}", e)))?;
        info!("JSON report saved to: {}", path.display());
        Ok(())
    }
}

/// Writes a Markdown report into the run directory.
pub struct MarkdownReportingPlugin;

impl Plugin for MarkdownReportingPlugin {
    fn name(&self) -> &str {
        "write_markdown"
    }
}

#[async_trait]
impl ReportingPlugin for MarkdownReportingPlugin {
    async fn report(
        &self,
        package: &Package,
        issues: &IssueMap,
        level: &str,
        ctx: &PluginContext,
    ) -> Result<(), PluginError> {
        let path = report_path(package, level, ctx, "md");
        let report = Report::new(package, level, issues);

        write_markdown_report(&report, &path)
            .map_err(|e| PluginError::Other(format!("{:#}", e)))?;
        info!("Markdown report saved to: {}", path.display());
        Ok(())
    }
}
