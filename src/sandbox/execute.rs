use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::OneLanguageConfig;

use super::process::{Exit, run_child};

/// How the compiled program ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success { stdout: String },
    Failure { message: String, stderr: String },
    TimedOut { limit: Duration, stderr: String },
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    /// Wall-clock time from just before spawn until the child was reaped
    pub elapsed: Duration,
}

/// Runs the compiled program in `dir` with `test_input` on its standard input
pub async fn run(
    dir: &Path,
    toolchain: &OneLanguageConfig,
    test_input: &str,
    token: &CancellationToken,
) -> RunResult {
    let command = toolchain.run_command();
    let limit = Duration::from(toolchain.run_timeout);
    log::debug!("Running in {}: {}", dir.display(), command.join(" "));

    let started = Instant::now();
    let output = run_child(&command, dir, Some(test_input.as_bytes()), limit, token).await;
    let elapsed = started.elapsed();

    let status = match output {
        Err(e) => {
            log::warn!("Failed to start `{}`: {e}", command.join(" "));
            RunStatus::Failure {
                message: format!("failed to start `{}`: {e}", command.join(" ")),
                stderr: String::new(),
            }
        }
        Ok(output) => match output.exit {
            Exit::Completed(status) if status.success() => RunStatus::Success {
                stdout: output.stdout_lossy(),
            },
            Exit::Completed(status) => RunStatus::Failure {
                message: status.to_string(),
                stderr: output.stderr_lossy(),
            },
            Exit::TimedOut => RunStatus::TimedOut {
                limit,
                stderr: output.stderr_lossy(),
            },
            Exit::Cancelled => RunStatus::Failure {
                message: "execution cancelled by server shutdown".to_string(),
                stderr: output.stderr_lossy(),
            },
        },
    };

    RunResult { status, elapsed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MilliSecond;
    use crate::sandbox::Workspace;
    use crate::sandbox::tests::{sh_toolchain, test_root};

    async fn run_script(name: &str, script: &str, input: &str, toolchain: OneLanguageConfig) -> RunResult {
        let workspace = Workspace::create(&test_root(name), false).unwrap();
        workspace.stage(&toolchain.file_name, script).unwrap();
        run(workspace.dir(), &toolchain, input, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_run_echoes_input() {
        let result = run_script("run-echo", "read line\necho \"$line\"\n", "hello", sh_toolchain()).await;
        assert_eq!(
            result.status,
            RunStatus::Success {
                stdout: "hello\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_run_reports_exit_status_and_stderr() {
        let result = run_script("run-fail", "echo boom >&2\nexit 3\n", "", sh_toolchain()).await;
        match result.status {
            RunStatus::Failure { message, stderr } => {
                assert!(message.contains('3'), "{message}");
                assert_eq!(stderr, "boom\n");
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_measures_elapsed_time() {
        let result = run_script("run-elapsed", "sleep 0.2\n", "", sh_toolchain()).await;
        assert!(matches!(result.status, RunStatus::Success { .. }));
        assert!(result.elapsed >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let mut toolchain = sh_toolchain();
        toolchain.run_timeout = MilliSecond(200);
        let result = run_script("run-timeout", "echo waiting >&2\nexec sleep 30\n", "", toolchain).await;

        assert_eq!(
            result.status,
            RunStatus::TimedOut {
                limit: Duration::from_millis(200),
                stderr: "waiting\n".to_string()
            }
        );
        assert!(result.elapsed < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let mut toolchain = sh_toolchain();
        toolchain.run = vec!["/nonexistent/java".to_string()];
        let result = run_script("run-missing", "", "", toolchain).await;

        match result.status {
            RunStatus::Failure { message, stderr } => {
                assert!(message.contains("/nonexistent/java"));
                assert!(stderr.is_empty());
            }
            other => panic!("unexpected status {other:?}"),
        }
    }
}
