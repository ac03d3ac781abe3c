//! The executor capability set over every backend

use thiserror::Error;

use crate::compile::CompileExecutor;
use crate::config::BackendKind;
use crate::sandbox::{SandboxError, SandboxExecutor};
use crate::toolchain::{ToolchainError, ToolchainExecutor};
use crate::types::ExecutionResult;
use crate::worker::{WorkerError, WorkerExecutor};

/// Why an executor could not produce a result
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
}

/// One backend instance, selected once per run
#[derive(Debug)]
pub enum Executor {
    Sandboxed(SandboxExecutor),
    Worker(WorkerExecutor),
    Compiled(CompileExecutor),
    Toolchain(ToolchainExecutor),
}

impl Executor {
    pub fn kind(&self) -> BackendKind {
        match self {
            Executor::Sandboxed(_) => BackendKind::Sandbox,
            Executor::Worker(_) => BackendKind::Worker,
            Executor::Compiled(_) => BackendKind::Transpile,
            Executor::Toolchain(_) => BackendKind::Toolchain,
        }
    }

    /// Bring the backend to a ready state; repeated calls are no-ops
    pub async fn initialize(&self) -> Result<(), ExecutorError> {
        match self {
            Executor::Sandboxed(sandbox) => sandbox.initialize().await?,
            Executor::Worker(worker) => worker.initialize().await?,
            Executor::Compiled(compiled) => compiled.initialize().await?,
            Executor::Toolchain(toolchain) => toolchain.initialize().await?,
        }
        Ok(())
    }

    pub async fn execute(&self, code: &str) -> Result<ExecutionResult, ExecutorError> {
        let result = match self {
            Executor::Sandboxed(sandbox) => sandbox.execute(code).await?,
            Executor::Worker(worker) => worker.execute(code).await?,
            Executor::Compiled(compiled) => compiled.execute(code).await?,
            Executor::Toolchain(toolchain) => toolchain.execute(code).await?,
        };
        Ok(result)
    }

    /// Deliver a value to the pending input request; `false` when none is pending
    pub fn provide_input(&self, value: impl Into<String>) -> bool {
        match self {
            Executor::Sandboxed(sandbox) => sandbox.provide_input(value),
            Executor::Worker(worker) => worker.provide_input(value),
            Executor::Compiled(compiled) => compiled.provide_input(value),
            Executor::Toolchain(toolchain) => toolchain.provide_input(value),
        }
    }

    /// Release resources; an in-flight run resolves with its partial output
    pub fn destroy(&self) {
        match self {
            Executor::Sandboxed(sandbox) => sandbox.destroy(),
            Executor::Worker(worker) => worker.destroy(),
            Executor::Compiled(compiled) => compiled.destroy(),
            Executor::Toolchain(toolchain) => toolchain.destroy(),
        }
    }
}
