//! Checkwright - pluggable static-analysis orchestrator
//!
//! Runs discovery, analysis and reporting plugins over one or more
//! packages and collects every tool's findings into one report.
//!
//! Exit codes:
//!   0 - Every package analyzed, no issues above threshold
//!   1 - A package run failed (config, profile, missing plugin, etc.)
//!   2 - Issues found above --fail-on threshold

mod analysis;
mod cli;
mod config;
mod engine;
mod error;
mod exceptions;
mod models;
mod plugins;
mod profile;
mod report;
mod resolver;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use engine::{CancelToken, Orchestrator, ProfileSource, RunContext, RunOutcome};
use error::OrchestratorError;
use exceptions::Exceptions;
use futures::stream::{self, StreamExt};
use plugins::{Plugin, PluginRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    if args.list_plugins {
        list_plugins(&PluginRegistry::builtin());
        return Ok(());
    }

    // Initialize logging
    init_logging(&args);

    info!("Checkwright v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let outcomes = run_batch(args).await;
    std::process::exit(exit_code(&outcomes));
}

/// Handle --init-config: generate a default .checkwright.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml()?;
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize levels, plugin options, and excludes.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Print every registered plugin with its dependencies.
fn list_plugins(registry: &PluginRegistry) {
    fn line<P: Plugin + ?Sized>(plugin: &P) -> String {
        let deps = plugin.dependencies();
        let mut line = format!("  {}", plugin.name());
        if !deps.is_empty() {
            line.push_str(&format!(" (after: {})", deps.join(", ")));
        }
        if let Some(cmd) = plugin.required_command() {
            let mark = if plugin.command_exists() { "✅" } else { "❌" };
            line.push_str(&format!(" [{} {}]", mark, cmd));
        }
        line
    }

    let discovery = registry.discovery_plugins();
    let tools = registry.tool_plugins();
    let reporting = registry.reporting_plugins();

    println!("🔍 Discovery plugins:");
    for (_, plugin) in discovery.iter() {
        println!("{}", line(plugin.as_ref()));
    }
    println!("\n🔧 Tool plugins:");
    for (_, plugin) in tools.iter() {
        println!("{}", line(plugin.as_ref()));
    }
    println!("\n📝 Reporting plugins:");
    for (_, plugin) in reporting.iter() {
        println!("{}", line(plugin.as_ref()));
    }

    let failures = discovery
        .failures()
        .iter()
        .chain(tools.failures())
        .chain(reporting.failures());
    for (name, reason) in failures {
        println!("  ⚠️  {} failed to load: {}", name, reason);
    }
}

/// Load configuration, falling back to the built-in defaults when the
/// implicit config file is broken. `None` makes every run fail.
fn load_config(args: &Args) -> Option<Arc<Config>> {
    match Config::load_layered(args.config.as_deref()) {
        Ok(config) => Some(Arc::new(config)),
        Err(e) if args.config.is_none() => {
            warn!("Failed to load {}: {}", CONFIG_FILE_NAME, e);
            match Config::builtin() {
                Ok(config) => Some(Arc::new(config)),
                Err(e) => {
                    error!("Built-in configuration is invalid: {}", e);
                    None
                }
            }
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            None
        }
    }
}

/// Load exceptions; a broken file is reported and ignored.
fn load_exceptions(path: Option<&PathBuf>) -> Option<Arc<Exceptions>> {
    let path = path?;
    match Exceptions::load(path) {
        Ok(exceptions) => {
            info!("Loaded exceptions from {}", path.display());
            Some(Arc::new(exceptions))
        }
        Err(e) => {
            warn!("Ignoring exceptions: {}", e);
            None
        }
    }
}

/// Build the run context from configuration and arguments.
fn build_context(args: &Args, cancel: CancelToken) -> RunContext {
    let mut ctx = RunContext::new(load_config(args));

    // validate() already rejected malformed overrides
    ctx.overrides = args.overrides().unwrap_or_default();
    ctx.exceptions = load_exceptions(args.exceptions.as_ref());
    ctx.profile = match args.profile {
        Some(ref path) => ProfileSource::File(path.clone()),
        None => ProfileSource::Builtin,
    };
    ctx.output_directory = args.output_directory.clone();
    if let Some(timeout) = args.timeout {
        ctx.timeout = Duration::from_secs(timeout);
    }
    if let Some(max) = args.max_concurrent {
        ctx.max_concurrent = max;
    }
    ctx.fail_on = args.fail_on.map(Into::into);
    ctx.show_tool_output = args.show_tool_output;
    ctx.show_progress = !args.quiet;
    ctx.cancel = cancel;
    ctx
}

/// Analyze every path, at most `args.jobs` at a time.
async fn run_batch(args: Args) -> Vec<RunOutcome> {
    let start_time = Instant::now();
    let cancel = CancelToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running plugins");
            interrupt.cancel();
        }
    });

    let ctx = build_context(&args, cancel.clone());
    let orchestrator = Orchestrator::new(Arc::new(PluginRegistry::builtin()), ctx);

    let outcomes = run_packages(&orchestrator, &args.paths, args.jobs).await;

    if cancel.is_cancelled() {
        eprintln!("\n⛔ Run interrupted; results are incomplete.");
    }
    if !args.quiet {
        print_summary(&outcomes, start_time.elapsed());
    }
    outcomes
}

/// Run the orchestrator over `paths`; outcomes keep the input order.
async fn run_packages(
    orchestrator: &Orchestrator,
    paths: &[PathBuf],
    jobs: usize,
) -> Vec<RunOutcome> {
    stream::iter(paths)
        .map(|path| orchestrator.run(path))
        .buffered(jobs.max(1))
        .collect()
        .await
}

fn print_summary(outcomes: &[RunOutcome], elapsed: Duration) {
    println!("\n📊 Batch Summary:");
    for outcome in outcomes {
        println!("   {}", summary_line(outcome));
    }
    println!("   Duration: {:.1}s", elapsed.as_secs_f64());
}

/// One line of the batch summary.
fn summary_line(outcome: &RunOutcome) -> String {
    let found = outcome.issues.as_ref().map_or(0, analysis::unique_count);

    match (&outcome.error, outcome.failed_in) {
        (Some(e), Some(state)) => format!("❌ {} (failed during {}): {}", outcome.package, state, e),
        (Some(e), None) => format!("❌ {}: {}", outcome.package, e),
        (None, _) if outcome.is_threshold_breach() => format!(
            "⛔ {}: {} issues, some above threshold",
            outcome.package, found
        ),
        (None, _) => format!("✅ {}: {} issues", outcome.package, found),
    }
}

/// 1 if any run failed, 2 if any crossed the threshold, else 0.
fn exit_code(outcomes: &[RunOutcome]) -> i32 {
    let fatal = |o: &RunOutcome| o.error.as_ref().is_some_and(OrchestratorError::is_fatal);
    if outcomes.iter().any(fatal) {
        1
    } else if outcomes.iter().any(|o| !o.success) {
        2
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RunState;
    use crate::models::IssueMap;

    fn outcome(success: bool, error: Option<OrchestratorError>) -> RunOutcome {
        RunOutcome {
            package: "pkg".to_string(),
            issues: error.is_none().then(IssueMap::new),
            success,
            error,
            failed_in: None,
        }
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&[]), 0);
        assert_eq!(exit_code(&[outcome(true, None)]), 0);
        assert_eq!(exit_code(&[outcome(true, None), outcome(false, None)]), 2);
        assert_eq!(
            exit_code(&[
                outcome(false, None),
                outcome(false, Some(OrchestratorError::Cancelled)),
            ]),
            1
        );
    }

    #[test]
    fn test_run_packages_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("missing_a"), dir.path().join("missing_b")];
        let ctx = RunContext::new(Some(Arc::new(Config::builtin().unwrap())));
        let orchestrator = Orchestrator::new(Arc::new(PluginRegistry::new()), ctx);

        let outcomes = tokio_test::block_on(run_packages(&orchestrator, &paths, 2));

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].package.ends_with("missing_a"));
        assert!(outcomes[1].package.ends_with("missing_b"));
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.error, Some(OrchestratorError::MissingPackage(_)))));
        assert_eq!(exit_code(&outcomes), 1);
    }

    #[test]
    fn test_summary_line() {
        let mut failed = outcome(false, Some(OrchestratorError::NoLevel("pkg".to_string())));
        failed.failed_in = Some(RunState::ConfigLoaded);
        assert_eq!(
            summary_line(&failed),
            "❌ pkg (failed during config loaded): No level configured for package pkg"
        );

        assert_eq!(summary_line(&outcome(true, None)), "✅ pkg: 0 issues");
        assert_eq!(
            summary_line(&outcome(false, None)),
            "⛔ pkg: 0 issues, some above threshold"
        );
    }

    #[test]
    fn test_failed_package_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::write(good.join("app.py"), "print('hi')\n").unwrap();
        let paths = vec![dir.path().join("missing"), good.clone()];

        // discovery and JSON reporting only, so no external tool is needed
        let config: Config = toml::from_str(
            "[levels.default.tool]\n[levels.default.reporting.write_json]\n",
        )
        .unwrap();
        let ctx = RunContext::new(Some(Arc::new(config)));
        let orchestrator = Orchestrator::new(Arc::new(PluginRegistry::builtin()), ctx);

        let outcomes = tokio_test::block_on(run_packages(&orchestrator, &paths, 2));

        assert!(!outcomes[0].success);
        assert!(matches!(outcomes[0].error, Some(OrchestratorError::MissingPackage(_))));
        assert!(outcomes[1].success, "{:?}", outcomes[1].error);
        assert_eq!(outcomes[1].issues, Some(IssueMap::new()));
        assert!(good.join("good-default").join("good-default.json").is_file());
        assert_eq!(exit_code(&outcomes), 1);
    }

    #[test]
    fn test_malformed_exceptions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exceptions.toml");

        std::fs::write(&path, "ignore_packages = [\"unterminated\"\n").unwrap();
        assert!(load_exceptions(Some(&path)).is_none());

        std::fs::write(&path, "ignore_packages = [\"legacy\"]\n").unwrap();
        let exceptions = load_exceptions(Some(&path)).unwrap();
        assert!(exceptions.is_ignored("legacy"));

        assert!(load_exceptions(None).is_none());
        assert!(load_exceptions(Some(&dir.path().join("absent.toml"))).is_none());
    }
}
