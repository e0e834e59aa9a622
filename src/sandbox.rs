mod compile;
mod execute;
mod process;
mod resource;
mod workspace;

pub use compile::{CompileFailure, compile};
pub use execute::{RunResult, RunStatus, run};
pub use resource::{ResourceSnapshot, server_memory_bytes};
pub use workspace::Workspace;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{Language, LanguageConfig, OneLanguageConfig, WorkspaceConfig};

/// A validated submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub code: String,
    pub language: Language,
    pub test_input: String,
}

/// Terminal result of one compile-and-run pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    CompileFailure { diagnostics: String },
    RuntimeFailure { message: String, stderr: String },
    TimedOut { limit: Duration, stderr: String },
    Success { stdout: String },
}

impl From<RunStatus> for ExecutionOutcome {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success { stdout } => Self::Success { stdout },
            RunStatus::Failure { message, stderr } => Self::RuntimeFailure { message, stderr },
            RunStatus::TimedOut { limit, stderr } => Self::TimedOut { limit, stderr },
        }
    }
}

/// What a request gets back once the pipeline reached a terminal state
#[derive(Debug, Clone)]
pub struct Report {
    pub outcome: ExecutionOutcome,
    pub resources: ResourceSnapshot,
}

impl Report {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Success { .. })
    }
}

/// Failures that end a request before any execution result exists
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input")]
    InvalidInput,

    #[error("Only Java language is supported")]
    UnsupportedLanguage(String),

    #[error("Failed to save code")]
    Stage(#[source] std::io::Error),
}

/// Stages, compiles and runs submissions, one private workspace per request
///
/// There is no queue in front of it: every request runs its own pipeline and
/// spawns its own compiler and program processes.
pub struct Sandbox {
    root: PathBuf,
    keep_workspaces: bool,
    languages: LanguageConfig,
    token: CancellationToken,
}

impl Sandbox {
    pub fn build(
        workspace: &WorkspaceConfig,
        languages: LanguageConfig,
        token: CancellationToken,
    ) -> anyhow::Result<Self> {
        let root = workspace.root_dir();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("unable to create workspace root {}", root.display()))?;

        log::info!("Staging submissions under {}", root.display());
        if workspace.keep_workspaces {
            log::warn!("Workspaces are kept after each request and must be cleaned up manually");
        }

        Ok(Self {
            root,
            keep_workspaces: workspace.keep_workspaces,
            languages,
            token,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn toolchain(&self, language: Language) -> Option<&OneLanguageConfig> {
        self.languages.iter().find(|l| l.name == language)
    }

    /// Writes the source into a fresh workspace
    pub fn stage(&self, toolchain: &OneLanguageConfig, code: &str) -> Result<Workspace, PipelineError> {
        let stage = || -> std::io::Result<Workspace> {
            let workspace = Workspace::create(&self.root, self.keep_workspaces)?;
            workspace.stage(&toolchain.file_name, code)?;
            Ok(workspace)
        };

        stage().map_err(|e| {
            log::error!("Failed to stage submission under {}: {e}", self.root.display());
            PipelineError::Stage(e)
        })
    }

    /// stage -> compile -> run, stopping at the first failure
    pub async fn execute(&self, submission: &Submission) -> Result<Report, PipelineError> {
        let toolchain = self
            .toolchain(submission.language)
            .ok_or_else(|| PipelineError::UnsupportedLanguage(submission.language.to_string()))?;

        let workspace = self.stage(toolchain, &submission.code)?;
        log::debug!("Workspace {}: staged {}", workspace.id(), toolchain.file_name);

        if let Err(CompileFailure { diagnostics }) =
            compile(workspace.dir(), toolchain, &self.token).await
        {
            log::info!("Workspace {}: compilation failed", workspace.id());
            return Ok(Report {
                outcome: ExecutionOutcome::CompileFailure { diagnostics },
                resources: ResourceSnapshot::capture(Duration::ZERO),
            });
        }

        let RunResult { status, elapsed } = run(
            workspace.dir(),
            toolchain,
            &submission.test_input,
            &self.token,
        )
        .await;
        let resources = ResourceSnapshot::capture(elapsed);

        let outcome = ExecutionOutcome::from(status);
        match &outcome {
            ExecutionOutcome::Success { .. } => {
                log::info!("Workspace {}: finished in {elapsed:?}", workspace.id())
            }
            ExecutionOutcome::TimedOut { limit, .. } => {
                log::warn!("Workspace {}: killed after {limit:?}", workspace.id())
            }
            _ => log::info!("Workspace {}: runtime failure", workspace.id()),
        }

        Ok(Report { outcome, resources })
    }
}
