//! External command execution for plugins.
//!
//! Commands are spawned with `kill_on_drop`, so when the engine drops an
//! invocation (timeout or cancellation) the child process is killed.
//! Only the direct child receives the kill; processes it forked itself
//! keep running until they exit on their own.

use super::PluginError;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub program: String,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Turn an unexpected exit code into an error.
    ///
    /// Many analysis tools exit non-zero when they find issues, so each
    /// plugin says which codes are normal.
    pub fn check_exit(self, accepted: impl Fn(i32) -> bool) -> Result<Self, PluginError> {
        match self.code {
            Some(code) if accepted(code) => Ok(self),
            code => Err(PluginError::ExitStatus {
                command: self.program.clone(),
                code,
                output: self.combined(),
            }),
        }
    }
}

/// Run `program` with `args` in `cwd` and capture its output.
///
/// Dropping the returned future kills the child but not its own
/// children, so wrapper scripts may leave grandchild processes behind.
pub async fn run_command(
    program: &str,
    args: &[String],
    cwd: &Path,
) -> Result<CommandOutput, PluginError> {
    let resolved =
        which::which(program).map_err(|_| PluginError::CommandNotFound(program.to_string()))?;

    debug!("Running {} {}", resolved.display(), args.join(" "));
    let start = Instant::now();

    let output = Command::new(&resolved)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| PluginError::Spawn {
            command: program.to_string(),
            source,
        })?;

    let code = output.status.code();
    debug!(
        "{} finished in {:.2}s with exit code {:?}",
        program,
        start.elapsed().as_secs_f32(),
        code
    );

    Ok(CommandOutput {
        program: program.to_string(),
        code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: Option<i32>) -> CommandOutput {
        CommandOutput {
            program: "tool".to_string(),
            code,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        }
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(output(Some(0)).combined(), "out\nerr");
        let mut only_stdout = output(Some(0));
        only_stdout.stderr.clear();
        assert_eq!(only_stdout.combined(), "out");
    }

    #[test]
    fn test_check_exit() {
        assert!(output(Some(1)).check_exit(|c| c <= 1).is_ok());

        let err = output(Some(2)).check_exit(|c| c <= 1).unwrap_err();
        assert!(matches!(err, PluginError::ExitStatus { code: Some(2), .. }));

        let killed = output(None).check_exit(|_| true).unwrap_err();
        assert!(matches!(killed, PluginError::ExitStatus { code: None, .. }));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command("checkwright-surely-not-installed", &[], dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::CommandNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_echo() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command("sh", &["-c".to_string(), "echo hello".to_string()], dir.path())
            .await
            .unwrap();
        assert_eq!(out.code, Some(0));
        assert_eq!(out.stdout.trim(), "hello");
    }
}
