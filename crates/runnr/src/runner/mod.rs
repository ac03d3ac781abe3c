//! Dispatch facade for Runnr
//!
//! [`Runnr`] resolves a language tag, selects the backend configured for it and
//! runs one request at a time. Input requests raised by running code reach the
//! callback registered with [`Runnr::on_input_request`]; answers go back
//! through [`Runnr::provide_input`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, instrument, warn};

pub use crate::runner::executor::{Executor, ExecutorError};

mod executor;

use crate::{
    bridge::InputHook,
    compile::{CommandCompiler, CompileExecutor, Compiler, CompilerOptions, EMPTY_SOURCE_MESSAGE},
    config::{BackendKind, Config, ConfigError, Language},
    sandbox::{self, SandboxExecutor, SandboxLauncher},
    toolchain::{BytecodeToolchain, CommandToolchain, ToolchainArtifacts, ToolchainExecutor},
    transport::{HostMessage, InterpreterRequest, ProcessLauncher, SandboxMessage, WorkerMessage},
    types::{ExecutionRequest, ExecutionResult, InputRequest},
    worker::{self, WorkerExecutor, WorkerLauncher, WorkerRegistry},
};

/// Caller misuse of the facade
///
/// Everything that goes wrong while running code is reported through
/// [`ExecutionResult::stderr`] instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Code is already executing. Please wait for completion.")]
    AlreadyExecuting,
}

#[derive(Clone)]
struct ToolchainEntry {
    toolchain: Arc<dyn BytecodeToolchain>,
    artifacts: ToolchainArtifacts,
}

#[derive(Default)]
struct ActiveRun {
    running: bool,
    /// Target of `provide_input` while a run is in flight
    executor: Option<Arc<Executor>>,
}

/// Multi-language code runner
pub struct Runnr {
    config: Config,
    hook: InputHook,
    registry: Arc<WorkerRegistry>,
    sandboxes: HashMap<String, SandboxLauncher>,
    workers: HashMap<String, WorkerLauncher>,
    compilers: HashMap<String, Arc<dyn Compiler>>,
    toolchains: HashMap<String, ToolchainEntry>,
    active: Mutex<ActiveRun>,
}

impl Runnr {
    /// Create a runner whose backends are built from `config`
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    /// Create a runner with the embedded default languages
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    pub fn builder(config: Config) -> RunnrBuilder {
        RunnrBuilder {
            config,
            registry: None,
            sandboxes: HashMap::new(),
            workers: HashMap::new(),
            compilers: HashMap::new(),
            toolchains: HashMap::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registry holding the warm workers of this runner
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Run one request to completion
    ///
    /// Returns [`RunError::AlreadyExecuting`] while another run is in flight.
    #[instrument(skip(self, request), fields(language = %request.language))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, RunError> {
        let mut guard = self.begin()?;

        let Some((id, language)) = self.config.resolve(&request.language) else {
            debug!("unsupported language");
            return Ok(ExecutionResult::failure(format!(
                "Language '{}' is not supported",
                request.language
            )));
        };
        if request.code.trim().is_empty() {
            return Ok(ExecutionResult::failure(EMPTY_SOURCE_MESSAGE));
        }

        let executor = match self.executor_for(id, language) {
            Ok(executor) => Arc::new(executor),
            Err(e) => return Ok(ExecutionResult::failure(format!("Error: {e}"))),
        };
        debug!(language = id, backend = %executor.kind(), "dispatching");
        guard.arm(executor.clone());

        let outcome = match executor.initialize().await {
            Ok(()) => executor.execute(&request.code).await,
            Err(e) => Err(e),
        };
        guard.complete();

        Ok(outcome.unwrap_or_else(|e| {
            warn!(error = %e, "run failed");
            ExecutionResult::failure(format!("Error: {e}"))
        }))
    }

    /// Register the callback that receives input requests
    ///
    /// Replaces any earlier registration.
    pub fn on_input_request(&self, callback: impl Fn(InputRequest) + Send + Sync + 'static) {
        self.hook.set(Arc::new(callback));
    }

    /// Answer the oldest pending input request of the active run
    ///
    /// Returns `false` and drops the value when nothing is waiting for it.
    pub fn provide_input(&self, value: impl Into<String>) -> bool {
        let executor = self.lock_active().executor.clone();
        match executor {
            Some(executor) => executor.provide_input(value),
            None => {
                debug!("input provided with no active run");
                false
            }
        }
    }

    /// Canonical ids of every configured language, sorted
    pub fn supported_languages(&self) -> Vec<String> {
        self.config.language_ids()
    }

    pub fn is_language_supported(&self, tag: &str) -> bool {
        self.config.resolve(tag).is_some()
    }

    pub fn is_running(&self) -> bool {
        self.lock_active().running
    }

    /// Stop the active run and shut down every warm worker
    ///
    /// The active run resolves with the output it produced so far. The runner
    /// stays usable; later runs start fresh backends.
    pub fn destroy(&self) {
        let executor = self.lock_active().executor.clone();
        if let Some(executor) = executor {
            debug!(backend = %executor.kind(), "destroying active executor");
            executor.destroy();
        }
        self.registry.shutdown_all();
    }

    fn begin(&self) -> Result<RunGuard<'_>, RunError> {
        let mut active = self.lock_active();
        if active.running {
            return Err(RunError::AlreadyExecuting);
        }
        active.running = true;
        Ok(RunGuard {
            runnr: self,
            completed: false,
        })
    }

    fn executor_for(&self, id: &str, language: &Language) -> Result<Executor, ConfigError> {
        let missing = |what: &str| ConfigError::Invalid(format!("language '{id}' has no {what}"));

        let executor = match language.backend {
            BackendKind::Sandbox => Executor::Sandboxed(self.sandbox_for(id)?),
            BackendKind::Worker => {
                let launcher = self.workers.get(id).ok_or_else(|| missing("worker launcher"))?;
                Executor::Worker(WorkerExecutor::new(
                    id,
                    self.registry.clone(),
                    launcher.clone(),
                    self.config.worker_ready_timeout(),
                    self.hook.clone(),
                ))
            }
            BackendKind::Transpile => {
                let compiler = self.compilers.get(id).ok_or_else(|| missing("compiler"))?;
                let transpile = language.transpile.as_ref();
                let options = compiler_options(language);
                let compiled = CompileExecutor::new(id, compiler.clone(), options);
                match transpile.and_then(|t| t.delegate.as_deref()) {
                    Some(delegate) => {
                        let (delegate_id, _) = self
                            .config
                            .resolve(delegate)
                            .ok_or_else(|| ConfigError::LanguageNotFound(delegate.to_owned()))?;
                        Executor::Compiled(compiled.with_delegate(self.sandbox_for(delegate_id)?))
                    }
                    None => Executor::Compiled(compiled),
                }
            }
            BackendKind::Toolchain => {
                let entry = self.toolchains.get(id).ok_or_else(|| missing("toolchain"))?;
                Executor::Toolchain(ToolchainExecutor::new(
                    id,
                    entry.toolchain.clone(),
                    entry.artifacts.clone(),
                ))
            }
        };
        Ok(executor)
    }

    fn sandbox_for(&self, id: &str) -> Result<SandboxExecutor, ConfigError> {
        let launcher = self.sandboxes.get(id).ok_or_else(|| {
            ConfigError::Invalid(format!("language '{id}' has no sandbox launcher"))
        })?;
        Ok(SandboxExecutor::new(id, launcher.clone(), self.hook.clone()))
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveRun> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Runnr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runnr")
            .field("languages", &self.supported_languages())
            .field("running", &self.is_running())
            .field("registry", &self.registry)
            .finish()
    }
}

/// Clears the active run on every exit path
///
/// A run whose future is dropped before completion has its executor destroyed
/// so a warm worker never keeps running abandoned code.
struct RunGuard<'a> {
    runnr: &'a Runnr,
    completed: bool,
}

impl RunGuard<'_> {
    fn arm(&mut self, executor: Arc<Executor>) {
        self.runnr.lock_active().executor = Some(executor);
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let executor = {
            let mut active = self.runnr.lock_active();
            active.running = false;
            active.executor.take()
        };
        if let Some(executor) = executor
            && !self.completed
        {
            debug!(backend = %executor.kind(), "run abandoned");
            executor.destroy();
        }
    }
}

fn compiler_options(language: &Language) -> CompilerOptions {
    let mut options = CompilerOptions::default();
    if let Some(transpile) = &language.transpile {
        if let Some(target) = &transpile.target {
            options.target = target.clone();
        }
        if let Some(module) = &transpile.module {
            options.module = module.clone();
        }
        if let Some(strict) = transpile.strict {
            options.strict = strict;
        }
    }
    options
}

/// Builder for [`Runnr`]
///
/// Backends not overridden here are built from the configuration.
pub struct RunnrBuilder {
    config: Config,
    registry: Option<Arc<WorkerRegistry>>,
    sandboxes: HashMap<String, SandboxLauncher>,
    workers: HashMap<String, WorkerLauncher>,
    compilers: HashMap<String, Arc<dyn Compiler>>,
    toolchains: HashMap<String, ToolchainEntry>,
}

impl RunnrBuilder {
    /// Share a worker registry, e.g. between several runners
    pub fn registry(mut self, registry: Arc<WorkerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn sandbox_launcher(mut self, language: impl Into<String>, launcher: SandboxLauncher) -> Self {
        self.sandboxes.insert(language.into(), launcher);
        self
    }

    pub fn worker_launcher(mut self, language: impl Into<String>, launcher: WorkerLauncher) -> Self {
        self.workers.insert(language.into(), launcher);
        self
    }

    pub fn compiler(mut self, language: impl Into<String>, compiler: Arc<dyn Compiler>) -> Self {
        self.compilers.insert(language.into(), compiler);
        self
    }

    pub fn toolchain(
        mut self,
        language: impl Into<String>,
        toolchain: Arc<dyn BytecodeToolchain>,
        artifacts: ToolchainArtifacts,
    ) -> Self {
        self.toolchains.insert(
            language.into(),
            ToolchainEntry {
                toolchain,
                artifacts,
            },
        );
        self
    }

    pub fn build(mut self) -> Runnr {
        for (id, language) in &self.config.languages {
            match language.backend {
                BackendKind::Sandbox => {
                    if let Some(runtime) = &language.runtime
                        && !self.sandboxes.contains_key(id)
                    {
                        let command = Language::expand_command(
                            &runtime.command,
                            &[("{bootstrap}", sandbox::BOOTSTRAP)],
                        );
                        let launcher: ProcessLauncher<HostMessage, SandboxMessage> =
                            ProcessLauncher::new(id.clone(), command).envs(runtime.env.clone());
                        self.sandboxes.insert(id.clone(), Arc::new(launcher));
                    }
                }
                BackendKind::Worker => {
                    if let Some(runtime) = &language.runtime
                        && !self.workers.contains_key(id)
                    {
                        let command = Language::expand_command(
                            &runtime.command,
                            &[("{bootstrap}", worker::BOOTSTRAP)],
                        );
                        let launcher: ProcessLauncher<InterpreterRequest, WorkerMessage> =
                            ProcessLauncher::new(id.clone(), command).envs(runtime.env.clone());
                        self.workers.insert(id.clone(), Arc::new(launcher));
                    }
                }
                BackendKind::Transpile => {
                    if let Some(transpile) = &language.transpile
                        && !self.compilers.contains_key(id)
                    {
                        let compiler = CommandCompiler::from_config(transpile);
                        self.compilers.insert(id.clone(), Arc::new(compiler));
                    }
                }
                BackendKind::Toolchain => {
                    if let (Some(compile), Some(run)) = (&language.compile, &language.run)
                        && !self.toolchains.contains_key(id)
                    {
                        let mut toolchain = CommandToolchain::new(id.clone(), compile.clone(), run.clone());
                        if let Some(dir) = &self.config.work_dir {
                            toolchain = toolchain.work_dir(dir.clone());
                        }
                        let artifacts = toolchain.artifacts();
                        self.toolchains.insert(
                            id.clone(),
                            ToolchainEntry {
                                toolchain: Arc::new(toolchain),
                                artifacts,
                            },
                        );
                    }
                }
            }
        }

        Runnr {
            registry: self.registry.unwrap_or_default(),
            config: self.config,
            hook: InputHook::new(),
            sandboxes: self.sandboxes,
            workers: self.workers,
            compilers: self.compilers,
            toolchains: self.toolchains,
            active: Mutex::new(ActiveRun::default()),
        }
    }
}
