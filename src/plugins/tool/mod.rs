//! Built-in tool plugins.
//!
//! Each plugin wraps one external analyzer: it builds the command line
//! from facts and options, runs it through [`run_tool`] and parses the
//! output into issues.

mod bandit;
mod lizard;
mod pylint;
mod shellcheck;

pub use bandit::BanditToolPlugin;
pub use lizard::LizardToolPlugin;
pub use pylint::PylintToolPlugin;
pub use shellcheck::ShellcheckToolPlugin;

use super::process::{run_command, CommandOutput};
use super::{PluginContext, PluginError};
use crate::models::Package;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Run a tool command in the package root.
///
/// The full output is written to `<tool>.log` in the run directory and
/// echoed when raw tool output was requested. Exit codes outside
/// `accepted` turn into `PluginError::ExitStatus`.
pub(crate) async fn run_tool(
    tool: &str,
    program: &str,
    args: &[String],
    package: &Package,
    ctx: &PluginContext,
    accepted: impl Fn(i32) -> bool,
) -> Result<CommandOutput, PluginError> {
    let output = run_command(program, args, package.path()).await?;
    let combined = output.combined();

    if ctx.show_tool_output {
        println!("{}", combined);
    }

    let log = format!("{} {}\n\n{}", program, args.join(" "), combined);
    let path = ctx.write_log(tool, &log)?;
    debug!("Wrote {} output to {}", tool, path.display());

    output.check_exit(accepted)
}

/// Compile a parser regex, reporting failures as a plugin load error.
pub(crate) fn compile(pattern: &str) -> Result<Regex, PluginError> {
    Regex::new(pattern).map_err(|e| PluginError::Other(format!("invalid output pattern: {}", e)))
}

/// Render a path reported by a tool relative to the package root when it
/// lies inside the package.
pub(crate) fn display_path(package: &Package, reported: &str) -> String {
    let path = Path::new(reported);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        package.path().join(path)
    };

    match absolute.strip_prefix(package.path()) {
        Ok(relative) => relative.display().to_string(),
        Err(_) => reported.to_string(),
    }
}

/// File arguments for a command, one per fact path.
pub(crate) fn path_args(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}
