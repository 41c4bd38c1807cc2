//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::{ConfigError, ConfigOverrides};
use crate::models::Severity;
use clap::Parser;
use std::path::PathBuf;

/// Checkwright - one invocation point for many static analysis tools
///
/// Runs discovery, analysis and reporting plugins over each package,
/// choosing the plugins from the level the profile assigns to it.
///
/// Examples:
///   checkwright ./my-package
///   checkwright ./pkg_a ./pkg_b --profile profile.toml --jobs 2
///   checkwright ./my-package --force-tool-list pylint,bandit --fail-on high
///   checkwright ./my-package --tool-option pylint.flags="--disable=C0114"
///   checkwright --list-plugins
///   checkwright --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Package directories to analyze
    #[arg(value_name = "PATH", required_unless_present_any = ["init_config", "list_plugins"])]
    pub paths: Vec<PathBuf>,

    /// Directory that receives the per-run output directories
    ///
    /// Defaults to each package directory.
    #[arg(short, long, value_name = "DIR", env = "CHECKWRIGHT_OUTPUT_DIRECTORY")]
    pub output_directory: Option<PathBuf>,

    /// Profile mapping package names to levels
    ///
    /// If not specified, every package runs at the `default` level.
    #[arg(short, long, value_name = "FILE", env = "CHECKWRIGHT_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .checkwright.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "CHECKWRIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Exceptions file listing ignored packages and issues
    #[arg(short, long, value_name = "FILE", env = "CHECKWRIGHT_EXCEPTIONS")]
    pub exceptions: Option<PathBuf>,

    /// Run exactly these tools instead of the level's (comma-separated)
    ///
    /// Dependencies enabled in the level are still pulled in.
    #[arg(long, value_name = "TOOLS", value_delimiter = ',')]
    pub force_tool_list: Option<Vec<String>>,

    /// Override a plugin option, e.g. pylint.flags="--disable=C0114"
    ///
    /// May be repeated. Applied after the configuration file and level.
    #[arg(long = "tool-option", value_name = "PLUGIN.KEY=VALUE")]
    pub tool_options: Vec<String>,

    /// Per-plugin timeout in seconds
    ///
    /// Default: from config or 300s.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Plugins run concurrently within one package
    #[arg(long, value_name = "NUM")]
    pub max_concurrent: Option<usize>,

    /// Packages analyzed concurrently
    #[arg(short, long, default_value = "1", value_name = "NUM")]
    pub jobs: usize,

    /// Fail if issues at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Echo raw tool output
    #[arg(long)]
    pub show_tool_output: bool,

    /// List registered plugins and exit
    #[arg(long)]
    pub list_plugins: bool,

    /// Generate a default .checkwright.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Severity {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => Severity::Low,
            FailOnLevel::Medium => Severity::Medium,
            FailOnLevel::High => Severity::High,
            FailOnLevel::Critical => Severity::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.jobs == 0 {
            return Err("Jobs must be at least 1".to_string());
        }

        if self.max_concurrent == Some(0) {
            return Err("Max concurrent must be at least 1".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref tools) = self.force_tool_list {
            if tools.iter().all(|t| t.trim().is_empty()) {
                return Err("--force-tool-list needs at least one tool".to_string());
            }
        }

        self.overrides().map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Forced tools and `--tool-option` values.
    pub fn overrides(&self) -> Result<ConfigOverrides, ConfigError> {
        let mut overrides = ConfigOverrides {
            forced_tools: self.force_tool_list.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            }),
            ..ConfigOverrides::default()
        };

        for option in &self.tool_options {
            overrides.parse_option(option)?;
        }

        Ok(overrides)
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            paths: vec![PathBuf::from("./pkg")],
            output_directory: None,
            profile: None,
            config: None,
            exceptions: None,
            force_tool_list: None,
            tool_options: Vec::new(),
            timeout: None,
            max_concurrent: None,
            jobs: 1,
            fail_on: None,
            show_tool_output: false,
            list_plugins: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "checkwright",
            "pkg_a",
            "pkg_b",
            "--force-tool-list",
            "pylint,bandit",
            "--tool-option",
            "pylint.flags=--disable=C0114",
            "--fail-on",
            "high",
            "-j",
            "2",
        ])
        .unwrap();

        assert_eq!(args.paths.len(), 2);
        assert_eq!(
            args.force_tool_list,
            Some(vec!["pylint".to_string(), "bandit".to_string()])
        );
        assert_eq!(args.fail_on, Some(FailOnLevel::High));
        assert_eq!(args.jobs, 2);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_paths_required_unless_listing() {
        assert!(Args::try_parse_from(["checkwright"]).is_err());
        assert!(Args::try_parse_from(["checkwright", "--list-plugins"]).is_ok());
        assert!(Args::try_parse_from(["checkwright", "--init-config"]).is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_limits() {
        let mut args = make_args();
        args.jobs = 0;
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.tool_options = vec!["missing-value".to_string()];
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut args = make_args();
        args.force_tool_list = Some(vec![" lizard ".to_string(), String::new()]);
        args.tool_options = vec!["lizard.timeout_seconds=10".to_string()];

        let overrides = args.overrides().unwrap();
        assert_eq!(overrides.forced_tools, Some(vec!["lizard".to_string()]));
        assert_eq!(
            overrides.plugin_options["lizard"]
                .get("timeout_seconds")
                .and_then(|v| v.as_integer()),
            Some(10)
        );
    }

    #[test]
    fn test_fail_on_to_severity() {
        assert_eq!(Severity::from(FailOnLevel::Medium), Severity::Medium);
        assert_eq!(Severity::from(FailOnLevel::Critical), Severity::Critical);
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
