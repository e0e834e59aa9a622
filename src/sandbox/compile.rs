use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::OneLanguageConfig;

use super::process::{Exit, run_child};

/// Compiler output of a failed compilation, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub diagnostics: String,
}

/// Compiles the staged unit in `dir` with the toolchain's compile command
///
/// Only the compiler's standard error is kept. A compiler that cannot be started
/// is reported the same way as one that rejects the source.
pub async fn compile(
    dir: &Path,
    toolchain: &OneLanguageConfig,
    token: &CancellationToken,
) -> Result<(), CompileFailure> {
    let command = toolchain.compile_command();
    let limit = Duration::from(toolchain.compile_timeout);
    log::debug!("Compiling in {}: {}", dir.display(), command.join(" "));

    let output = run_child(&command, dir, None, limit, token)
        .await
        .map_err(|e| {
            log::warn!("Failed to start compiler `{}`: {e}", command.join(" "));
            CompileFailure {
                diagnostics: format!("failed to start `{}`: {e}", command.join(" ")),
            }
        })?;

    let diagnostics = output.stderr_lossy();
    match output.exit {
        Exit::Completed(status) if status.success() => Ok(()),
        Exit::Completed(status) => {
            log::debug!("Compiler exited with {status}");
            Err(CompileFailure { diagnostics })
        }
        Exit::TimedOut => Err(CompileFailure {
            diagnostics: format!(
                "{diagnostics}compilation timed out after {} ms",
                limit.as_millis()
            ),
        }),
        Exit::Cancelled => Err(CompileFailure {
            diagnostics: format!("{diagnostics}compilation cancelled by server shutdown"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MilliSecond;
    use crate::sandbox::Workspace;
    use crate::sandbox::tests::{sh_toolchain, test_root};

    #[tokio::test]
    async fn test_compile_accepts_valid_source() {
        let workspace = Workspace::create(&test_root("compile-ok"), false).unwrap();
        let toolchain = sh_toolchain();
        workspace
            .stage(&toolchain.file_name, "echo fine\n")
            .unwrap();

        let result = compile(workspace.dir(), &toolchain, &CancellationToken::new()).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_compile_returns_raw_diagnostics() {
        let workspace = Workspace::create(&test_root("compile-err"), false).unwrap();
        let toolchain = sh_toolchain();
        workspace
            .stage(&toolchain.file_name, "if then fi (\n")
            .unwrap();

        let failure = compile(workspace.dir(), &toolchain, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(failure.diagnostics.contains(&toolchain.file_name));
    }

    #[tokio::test]
    async fn test_missing_compiler_is_a_compile_failure() {
        let workspace = Workspace::create(&test_root("compile-missing"), false).unwrap();
        let mut toolchain = sh_toolchain();
        toolchain.compile = vec!["/nonexistent/javac".to_string(), "%INPUT%".to_string()];

        let failure = compile(workspace.dir(), &toolchain, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(failure.diagnostics.contains("/nonexistent/javac"));
    }

    #[tokio::test]
    async fn test_compile_timeout() {
        let workspace = Workspace::create(&test_root("compile-timeout"), false).unwrap();
        let mut toolchain = sh_toolchain();
        toolchain.compile = vec!["/bin/sh".to_string(), "-c".to_string(), "exec sleep 30".to_string()];
        toolchain.compile_timeout = MilliSecond(200);

        let failure = compile(workspace.dir(), &toolchain, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(failure.diagnostics.contains("timed out after 200 ms"));
    }
}
