//! Worker-hosted execution backend
//!
//! An interpreter is expensive to start, so each language gets one warm worker
//! shared by every run: a dedicated thread with its own runtime that owns the
//! interpreter context. Workers live in a [`WorkerRegistry`]; a
//! [`WorkerExecutor`] is the per-run handle the facade works with.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::bridge::{InputBroker, InputHook};
use crate::transport::{InterpreterRequest, Launcher, WorkerMessage};
use crate::types::ExecutionResult;

mod handle;
mod registry;
mod thread;

pub use handle::WorkerHandle;
pub use registry::{WorkerRegistry, WorkerStatus};
pub use thread::{ASYNC_ENTRY, ASYNC_INPUT, prepare_run};

/// Bootstrap script evaluated by the default worker interpreter command
pub const BOOTSTRAP: &str = include_str!("../../runtimes/worker.py");

pub type WorkerLauncher = Arc<dyn Launcher<InterpreterRequest, WorkerMessage>>;

/// Why a worker could not be provided
///
/// Cloneable so one failed initialization can be reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("failed to start {language} worker thread: {reason}")]
    Thread { language: String, reason: String },

    #[error("{language} worker failed to start: {reason}")]
    Startup { language: String, reason: String },

    #[error("{language} worker did not become ready within {timeout:?}")]
    ReadyTimeout { language: String, timeout: Duration },

    #[error("{0} worker has been shut down")]
    ShutDown(String),
}

/// Per-run handle onto the shared worker of one language
pub struct WorkerExecutor {
    language: String,
    registry: Arc<WorkerRegistry>,
    launcher: WorkerLauncher,
    ready_timeout: Duration,
    broker: InputBroker,
    cancel: watch::Sender<bool>,
}

impl WorkerExecutor {
    pub fn new(
        language: impl Into<String>,
        registry: Arc<WorkerRegistry>,
        launcher: WorkerLauncher,
        ready_timeout: Duration,
        hook: InputHook,
    ) -> Self {
        let language = language.into();
        let (cancel, _) = watch::channel(false);
        Self {
            broker: InputBroker::new(language.clone(), hook),
            language,
            registry,
            launcher,
            ready_timeout,
            cancel,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Make sure the language's worker is running and ready
    pub async fn initialize(&self) -> Result<(), WorkerError> {
        self.acquire().await.map(|_| ())
    }

    #[instrument(skip(self, code), fields(language = %self.language))]
    pub async fn execute(&self, code: &str) -> Result<ExecutionResult, WorkerError> {
        let handle = self.acquire().await?;
        let mut cancel = self.cancel.subscribe();
        Ok(handle.execute(code, &self.broker, &mut cancel).await)
    }

    pub fn provide_input(&self, value: impl Into<String>) -> bool {
        self.broker.provide(value)
    }

    /// Cancel the in-flight run and shut the language's worker down
    pub fn destroy(&self) {
        if self.cancel.send_replace(true) {
            return;
        }
        self.broker.reset();
        self.registry.shutdown(&self.language);
        debug!(language = %self.language, "worker executor destroyed");
    }

    async fn acquire(&self) -> Result<Arc<WorkerHandle>, WorkerError> {
        if *self.cancel.borrow() {
            return Err(WorkerError::ShutDown(self.language.clone()));
        }
        self.registry
            .acquire(&self.language, self.launcher.clone(), self.ready_timeout)
            .await
    }
}

impl std::fmt::Debug for WorkerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerExecutor")
            .field("language", &self.language)
            .field("destroyed", &*self.cancel.borrow())
            .finish()
    }
}
