//! Ahead-of-time toolchain backend
//!
//! Languages such as Java, C, C++ and Rust are compiled to an artifact and then
//! run. The [`BytecodeToolchain`] contract keeps a compile failure, a missing
//! entry point and a successful run without output distinguishable.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::compile::parse_diagnostic;
use crate::types::ExecutionResult;

mod command;

pub use command::CommandToolchain;

pub const NO_OUTPUT_MESSAGE: &str = "No output from the main method";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("toolchain has not been initialized")]
    NotInitialized,

    #[error("toolchain program '{0}' not found")]
    MissingProgram(String),

    #[error("library artifact '{}' not found", .0.display())]
    MissingLibrary(PathBuf),

    #[error("Compilation failed:\n{0}")]
    Compile(String),

    #[error("Execution failed: missing entry point\n{0}")]
    MissingEntryPoint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a toolchain needs before it can compile anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainArtifacts {
    /// Programs resolved on `PATH` (compiler, runtime)
    pub programs: Vec<String>,
    /// Libraries that must exist (class libraries, runtime archives)
    pub libraries: Vec<PathBuf>,
}

/// Output of a program that compiled and ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolchainOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the program was killed by a signal
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait BytecodeToolchain: Send + Sync {
    /// Prepare the toolchain; repeated calls are no-ops
    async fn initialize(&self, artifacts: &ToolchainArtifacts) -> Result<(), ToolchainError>;

    async fn compile_and_run(&self, source: &str) -> Result<ToolchainOutput, ToolchainError>;
}

pub struct ToolchainExecutor {
    language: String,
    toolchain: Arc<dyn BytecodeToolchain>,
    artifacts: ToolchainArtifacts,
    cancel: watch::Sender<bool>,
}

impl ToolchainExecutor {
    pub fn new(
        language: impl Into<String>,
        toolchain: Arc<dyn BytecodeToolchain>,
        artifacts: ToolchainArtifacts,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            language: language.into(),
            toolchain,
            artifacts,
            cancel,
        }
    }

    pub async fn initialize(&self) -> Result<(), ToolchainError> {
        self.toolchain.initialize(&self.artifacts).await
    }

    #[instrument(skip(self, source), fields(language = %self.language))]
    pub async fn execute(&self, source: &str) -> Result<ExecutionResult, ToolchainError> {
        self.initialize().await?;

        let mut cancel = self.cancel.subscribe();
        let outcome = tokio::select! {
            biased;

            Ok(_) = cancel.wait_for(|cancelled| *cancelled) => {
                debug!("run cancelled");
                return Ok(ExecutionResult::failure("Execution cancelled"));
            }

            outcome = self.toolchain.compile_and_run(source) => outcome,
        };

        match outcome {
            Ok(output) => Ok(Self::to_result(output)),
            Err(ToolchainError::Compile(details)) => Ok(ExecutionResult {
                stdout: String::new(),
                diagnostics: details
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(parse_diagnostic)
                    .collect(),
                stderr: ToolchainError::Compile(details).to_string().trim().to_owned(),
            }),
            Err(e @ ToolchainError::MissingEntryPoint(_)) => {
                Ok(ExecutionResult::failure(e.to_string().trim()))
            }
            Err(e) => Err(e),
        }
    }

    fn to_result(output: ToolchainOutput) -> ExecutionResult {
        let mut stdout = output.stdout.trim().to_owned();
        if stdout.is_empty() {
            stdout = NO_OUTPUT_MESSAGE.to_owned();
        }

        let mut stderr = output.stderr.trim().to_owned();
        let status = match output.exit_code {
            Some(0) => None,
            Some(code) => Some(format!("Process exited with code {code}")),
            None => Some("Process terminated by a signal".to_owned()),
        };
        if let Some(status) = status {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&status);
        }

        ExecutionResult {
            stdout,
            stderr,
            diagnostics: Vec::new(),
        }
    }

    /// Toolchain programs read no input
    pub fn provide_input(&self, _value: impl Into<String>) -> bool {
        false
    }

    /// Cancel the in-flight run; its processes are killed
    pub fn destroy(&self) {
        self.cancel.send_replace(true);
    }
}

impl std::fmt::Debug for ToolchainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolchainExecutor")
            .field("language", &self.language)
            .field("artifacts", &self.artifacts)
            .finish()
    }
}
