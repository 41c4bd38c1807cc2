//! Execution engine.
//!
//! One [`Orchestrator::run`] analyzes one package:
//!
//! 1. Validate the package path, the output directory and configuration
//! 2. Skip packages listed in the exceptions
//! 3. Resolve the package's level from the profile
//! 4. Schedule discovery and tool plugins by dependency
//! 5. Run discovery, then tools, wave by wave
//! 6. Filter issues and hand them to the reporting plugins
//!
//! Tool failures are isolated; every other failure ends the run for this
//! package only.

mod cancel;

pub use cancel::CancelToken;

use crate::config::{Config, ConfigOverrides, Level};
use crate::error::OrchestratorError;
use crate::exceptions::{self, Exceptions};
use crate::models::{Facts, IssueMap, Package, Severity};
use crate::plugins::{
    DiscoveryPlugin, PluginContext, PluginError, PluginKind, PluginRegistry,
    ReportingPlugin, ToolPlugin,
};
use crate::profile::Profile;
use crate::resolver::{self, Schedule};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Lifecycle of a package run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    ConfigLoaded,
    LevelResolved,
    DiscoveryPhase,
    ToolPhase,
    ReportingPhase,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::ConfigLoaded => "config loaded",
            RunState::LevelResolved => "level resolved",
            RunState::DiscoveryPhase => "discovery phase",
            RunState::ToolPhase => "tool phase",
            RunState::ReportingPhase => "reporting phase",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Where the package-to-level profile comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProfileSource {
    /// Every package at the `default` level.
    #[default]
    Builtin,
    File(PathBuf),
}

/// Everything a run needs besides the package path.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// `None` when configuration failed to load; runs then fail.
    pub config: Option<Arc<Config>>,
    pub overrides: ConfigOverrides,
    pub exceptions: Option<Arc<Exceptions>>,
    pub profile: ProfileSource,
    /// Base for per-run directories; defaults to the package itself.
    pub output_directory: Option<PathBuf>,
    /// Default per-invocation timeout.
    pub timeout: Duration,
    /// Plugins run concurrently within a wave.
    pub max_concurrent: usize,
    /// Issues at or above this severity make the run unsuccessful.
    pub fail_on: Option<Severity>,
    pub show_tool_output: bool,
    pub show_progress: bool,
    pub cancel: CancelToken,
}

impl RunContext {
    /// A context with defaults taken from `config`.
    pub fn new(config: Option<Arc<Config>>) -> Self {
        let general = config.as_ref().map(|c| c.general.clone()).unwrap_or_default();

        Self {
            config,
            overrides: ConfigOverrides::default(),
            exceptions: None,
            profile: ProfileSource::Builtin,
            output_directory: None,
            timeout: Duration::from_secs(general.timeout_seconds()),
            max_concurrent: general.max_concurrent(),
            fail_on: None,
            show_tool_output: false,
            show_progress: false,
            cancel: CancelToken::new(),
        }
    }
}

/// Result of one package run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The target path as given.
    pub package: String,
    /// Issues keyed by tool; `None` when the run failed.
    pub issues: Option<IssueMap>,
    pub success: bool,
    pub error: Option<OrchestratorError>,
    /// State the run was in when it failed.
    pub failed_in: Option<RunState>,
}

impl RunOutcome {
    /// Completed, but issues crossed the `fail_on` threshold.
    pub fn is_threshold_breach(&self) -> bool {
        self.error.is_none() && !self.success
    }
}

/// Plugin schedule of one run, resolved before anything executes.
struct Plan {
    level: Level,
    run_dir: PathBuf,
    discovery: Vec<Vec<(String, Arc<dyn DiscoveryPlugin>)>>,
    /// Discovery plugins that failed to load or run.
    failed_discovery: BTreeSet<String>,
    tools: Vec<Vec<(String, Arc<dyn ToolPlugin>)>>,
    tool_count: usize,
    upstream: BTreeSet<String>,
}

/// Runs the plugin pipeline over packages.
pub struct Orchestrator {
    registry: Arc<PluginRegistry>,
    ctx: RunContext,
}

impl Orchestrator {
    pub fn new(registry: Arc<PluginRegistry>, ctx: RunContext) -> Self {
        Self { registry, ctx }
    }

    /// Analyze the package at `path`.
    pub async fn run(&self, path: &Path) -> RunOutcome {
        let start = Instant::now();
        let mut state = RunState::Init;

        let result = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => Err(OrchestratorError::Cancelled),
            result = self.drive(path, &mut state) => result,
        };

        let package = path.display().to_string();
        match result {
            Ok((issues, success)) => {
                info!(
                    "Finished {} in {:.2}s (success: {})",
                    package,
                    start.elapsed().as_secs_f32(),
                    success
                );
                RunOutcome {
                    package,
                    issues: Some(issues),
                    success,
                    error: None,
                    failed_in: None,
                }
            }
            Err(e) => {
                let failed_in = state;
                state = RunState::Failed;
                error!("{} failed during {}: {}", package, failed_in, e);
                debug!("{} state: {}", package, state);
                RunOutcome {
                    package,
                    issues: None,
                    success: false,
                    error: Some(e),
                    failed_in: Some(failed_in),
                }
            }
        }
    }

    async fn drive(
        &self,
        path: &Path,
        state: &mut RunState,
    ) -> Result<(IssueMap, bool), OrchestratorError> {
        let package = Package::from_path(path)
            .map_err(|_| OrchestratorError::MissingPackage(path.to_path_buf()))?;

        if let Some(base) = &self.ctx.output_directory {
            if !base.is_dir() {
                return Err(OrchestratorError::OutputDirectory {
                    path: base.clone(),
                    source: std::io::Error::other("not a directory"),
                });
            }
        }

        let config = self
            .ctx
            .config
            .as_ref()
            .ok_or_else(|| OrchestratorError::ConfigLoad("no usable configuration".to_string()))?;

        if exceptions::is_ignored(package.name(), self.ctx.exceptions.as_deref()) {
            info!("Package {} is ignored by exceptions", package.name());
            *state = RunState::Done;
            return Ok((IssueMap::new(), true));
        }
        *state = RunState::ConfigLoaded;

        let plan = self.plan(config, &package, state).await?;

        *state = RunState::DiscoveryPhase;
        let (facts, failed_discovery) = self.discover(config, &package, &plan).await;
        check_discovery_failures(&plan, &failed_discovery)?;

        *state = RunState::ToolPhase;
        let issues = self.scan(config, &package, &plan, &facts).await;
        let issues = match &self.ctx.exceptions {
            Some(exceptions) => exceptions.filter_issues(&package, issues),
            None => issues,
        };

        *state = RunState::ReportingPhase;
        self.report(config, &package, &plan, &issues).await?;

        let success = match self.ctx.fail_on {
            Some(threshold) => !issues.values().flatten().any(|i| i.severity >= threshold),
            None => true,
        };
        *state = RunState::Done;

        Ok((issues, success))
    }

    /// Resolve the level, create the run directory and schedule discovery
    /// and tool plugins.
    async fn plan(
        &self,
        config: &Config,
        package: &Package,
        state: &mut RunState,
    ) -> Result<Plan, OrchestratorError> {
        let profile = match &self.ctx.profile {
            ProfileSource::Builtin => Profile::builtin(),
            ProfileSource::File(path) => Profile::load(path)?,
        };

        let level_name = profile
            .level_for(package.name())
            .ok_or_else(|| OrchestratorError::NoLevel(package.name().to_string()))?;
        let level = config.level(level_name).map_err(|e| {
            warn!("{}", e);
            OrchestratorError::InvalidLevel(level_name.to_string())
        })?;
        info!("Analyzing {} at level {}", package.name(), level.name());
        *state = RunState::LevelResolved;

        let base = self
            .ctx
            .output_directory
            .clone()
            .unwrap_or_else(|| package.path().to_path_buf());
        let run_dir = base.join(format!("{}-{}", package.name(), level.name()));
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|source| OrchestratorError::OutputDirectory {
                path: run_dir.clone(),
                source,
            })?;
        debug!("Run directory: {}", run_dir.display());

        // Discovery: load failures are tolerated here and surface if a
        // tool needs the plugin.
        let discovery = self.registry.discovery_plugins();
        let requested = level
            .enabled_discovery()
            .unwrap_or_else(|| discovery.names());
        let mut failed_discovery = BTreeSet::new();
        let mut loaded = BTreeSet::new();
        for name in &requested {
            match discovery.get(name) {
                Ok(_) => {
                    loaded.insert(name.clone());
                }
                Err(e @ OrchestratorError::PluginLoad { .. }) => {
                    warn!("{}", e);
                    failed_discovery.insert(name.clone());
                }
                Err(e) => return Err(e),
            }
        }

        let discovery_schedule = resolver::resolve(
            &loaded.iter().cloned().collect::<Vec<_>>(),
            &loaded,
            &failed_discovery,
            |name| discovery.get(name).map(|p| p.dependencies()),
        )?;

        let tools = self.registry.tool_plugins();
        let level_tools = level.enabled_tools();
        let (requested_tools, enabled_tools) = match &self.ctx.overrides.forced_tools {
            Some(forced) => {
                let mut enabled = level_tools;
                enabled.extend(forced.iter().cloned());
                (forced.clone(), enabled)
            }
            None => (level_tools.iter().cloned().collect(), level_tools),
        };

        let tool_schedule = resolver::resolve(
            &requested_tools,
            &enabled_tools,
            &discovery_schedule.names(),
            |name| tools.get(name).map(|p| p.dependencies()),
        )?;
        debug!(
            "Discovery order: {:?}, tool order: {:?}",
            discovery_schedule.order(),
            tool_schedule.order()
        );

        if tool_schedule.is_empty() {
            warn!("No tool plugins enabled for level {}", level.name());
        }

        let mut upstream = discovery_schedule.names();
        upstream.extend(tool_schedule.names());

        Ok(Plan {
            discovery: instantiate(&discovery_schedule, |n| discovery.get(n))?,
            tools: instantiate(&tool_schedule, |n| tools.get(n))?,
            tool_count: tool_schedule.len(),
            failed_discovery,
            upstream,
            level,
            run_dir,
        })
    }

    fn plugin_context(
        &self,
        config: &Config,
        plan: &Plan,
        kind: PluginKind,
        name: &str,
    ) -> PluginContext {
        let options = config.plugin_options(&plan.level, kind, name, &self.ctx.overrides);

        let timeout = options
            .get("timeout_seconds")
            .and_then(|v| v.as_integer())
            .filter(|secs| *secs > 0)
            .map_or(self.ctx.timeout, |secs| Duration::from_secs(secs as u64));
        let exclude_dirs = match options.get("exclude_dirs") {
            Some(toml::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => config.general.exclude_dirs(),
        };

        PluginContext {
            output_dir: plan.run_dir.clone(),
            options,
            timeout,
            exclude_dirs,
            show_tool_output: self.ctx.show_tool_output,
        }
    }

    async fn discover(
        &self,
        config: &Config,
        package: &Package,
        plan: &Plan,
    ) -> (Facts, BTreeSet<String>) {
        let semaphore = Semaphore::new(self.ctx.max_concurrent.max(1));
        let mut facts = Facts::new();
        let mut failed = plan.failed_discovery.clone();

        for wave in &plan.discovery {
            let mut runnable = Vec::new();
            for (name, plugin) in wave {
                match plugin.dependencies().into_iter().find(|d| failed.contains(d)) {
                    Some(dependency) => {
                        warn!("Skipping discovery plugin {}: {} failed", name, dependency);
                        failed.insert(name.clone());
                    }
                    None => runnable.push((name, plugin)),
                }
            }

            let semaphore = &semaphore;
            let results = join_all(runnable.into_iter().map(|(name, plugin)| {
                let ctx = self.plugin_context(config, plan, PluginKind::Discovery, name);
                async move {
                    let timeout = ctx.timeout;
                    let result = invoke(semaphore, timeout, plugin.scan(package, &ctx)).await;
                    (name, result)
                }
            }))
            .await;

            for (name, result) in results {
                match result {
                    Ok(found) => {
                        debug!("Discovery plugin {} found facts: {:?}", name, found.keys().collect::<Vec<_>>());
                        facts.merge(found);
                    }
                    Err(e) => {
                        warn!("Discovery plugin {} failed: {}", name, e);
                        failed.insert(name.clone());
                    }
                }
            }
        }

        if facts.is_empty() {
            debug!("No facts discovered in {}", package.name());
        }
        (facts, failed)
    }

    async fn scan(&self, config: &Config, package: &Package, plan: &Plan, facts: &Facts) -> IssueMap {
        let semaphore = Semaphore::new(self.ctx.max_concurrent.max(1));
        let progress = self.progress_bar(plan.tool_count as u64);
        let mut issues = IssueMap::new();

        for wave in &plan.tools {
            let semaphore = &semaphore;
            let progress = &progress;
            let results = join_all(wave.iter().map(|(name, plugin)| {
                let ctx = self.plugin_context(config, plan, PluginKind::Tool, name);
                async move {
                    let timeout = ctx.timeout;
                    let result = invoke(semaphore, timeout, plugin.scan(package, facts, &ctx)).await;
                    progress.inc(1);
                    (name, result)
                }
            }))
            .await;

            for (name, result) in results {
                let found = match result {
                    Ok(found) => {
                        debug!("Tool {} reported {} issues", name, found.len());
                        found
                    }
                    Err(e) => {
                        let failure = OrchestratorError::ToolInvocation {
                            tool: name.clone(),
                            reason: e.to_string(),
                        };
                        warn!("{}", failure);
                        Vec::new()
                    }
                };
                issues.insert(name.clone(), found);
            }
        }

        progress.finish_and_clear();
        issues
    }

    async fn report(
        &self,
        config: &Config,
        package: &Package,
        plan: &Plan,
        issues: &IssueMap,
    ) -> Result<(), OrchestratorError> {
        let enabled = plan.level.enabled_reporting();
        if enabled.is_empty() {
            return Err(OrchestratorError::NoReportingPlugin(plan.level.name().to_string()));
        }

        let reporting = self.registry.reporting_plugins();
        let schedule = resolver::resolve(
            &enabled.iter().cloned().collect::<Vec<_>>(),
            &enabled,
            &plan.upstream,
            |name| reporting.get(name).map(|p| p.dependencies()),
        )?;
        let semaphore = Semaphore::new(1);

        // One at a time so console output stays readable
        for name in schedule.order() {
            let plugin: Arc<dyn ReportingPlugin> = reporting.get(&name)?;
            let ctx = self.plugin_context(config, plan, PluginKind::Reporting, &name);
            let result = invoke(
                &semaphore,
                ctx.timeout,
                plugin.report(package, issues, plan.level.name(), &ctx),
            )
            .await;

            if let Err(e) = result {
                return Err(OrchestratorError::ReportingFailed {
                    plugin: name,
                    reason: e.to_string(),
                });
            }
        }

        Ok(())
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.ctx.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tools")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Look up the plugin for every scheduled name, keeping the waves.
fn instantiate<P: ?Sized>(
    schedule: &Schedule,
    lookup: impl Fn(&str) -> Result<Arc<P>, OrchestratorError>,
) -> Result<Vec<Vec<(String, Arc<P>)>>, OrchestratorError> {
    let mut waves = Vec::with_capacity(schedule.waves().len());
    for wave in schedule.waves() {
        let mut plugins = Vec::with_capacity(wave.len());
        for name in wave {
            plugins.push((name.clone(), lookup(name)?));
        }
        waves.push(plugins);
    }
    Ok(waves)
}

/// A tool that needs a discovery plugin that failed cannot run.
fn check_discovery_failures(
    plan: &Plan,
    failed: &BTreeSet<String>,
) -> Result<(), OrchestratorError> {
    for (name, plugin) in plan.tools.iter().flatten() {
        if let Some(dependency) = plugin.dependencies().into_iter().find(|d| failed.contains(d)) {
            return Err(OrchestratorError::MissingDependency {
                plugin: name.clone(),
                dependency,
            });
        }
    }
    Ok(())
}

/// Run one plugin call under the concurrency limit and its timeout.
async fn invoke<T, F>(semaphore: &Semaphore, timeout: Duration, call: F) -> Result<T, PluginError>
where
    F: Future<Output = Result<T, PluginError>>,
{
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|_| PluginError::Cancelled)?;

    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(PluginError::Timeout(timeout)),
    }
}
