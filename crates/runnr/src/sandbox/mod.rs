//! Sandboxed execution backend
//!
//! Each [`SandboxExecutor`] owns one isolated evaluation context, created
//! lazily on first use and reused for every run until the executor is
//! destroyed. Output arrives as chunk messages and input requests are bridged
//! through the executor's [`InputBroker`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::bridge::input::next_input;
use crate::bridge::rewrite::{Syntax, rewrite_calls};
use crate::bridge::{InputBroker, InputHook, OutputAggregator};
use crate::transport::{Endpoint, HostMessage, Launcher, SandboxMessage, TransportError};
use crate::types::{ExecutionResult, StreamKind};

/// Bootstrap script evaluated by the default sandbox command
pub const BOOTSTRAP: &str = include_str!("../../runtimes/sandbox.js");

/// Name of the async prompt function injected into the sandbox
pub const PROMPT_FUNCTION: &str = "__runnrPrompt";

const BLOCKING_PROMPT: &str = "prompt";

pub type SandboxLauncher = Arc<dyn Launcher<HostMessage, SandboxMessage>>;

type Context = Endpoint<HostMessage, SandboxMessage>;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox has been destroyed")]
    Destroyed,

    #[error("failed to start sandbox: {0}")]
    Launch(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Unstarted,
    Initializing,
    Ready,
    Executing,
    Destroyed,
}

/// Handle to one sandboxed execution context
///
/// Clones share the same context, so one clone may destroy a run another
/// clone is awaiting.
#[derive(Clone)]
pub struct SandboxExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    language: String,
    launcher: SandboxLauncher,
    broker: InputBroker,
    state: Mutex<SandboxState>,
    /// Holding this lock is what serializes runs
    context: tokio::sync::Mutex<Option<Context>>,
    destroyed: watch::Sender<bool>,
}

enum RunOutcome {
    Completed,
    ContextLost,
    Destroyed,
}

impl SandboxExecutor {
    pub fn new(language: impl Into<String>, launcher: SandboxLauncher, hook: InputHook) -> Self {
        let language = language.into();
        let (destroyed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                broker: InputBroker::new(language.clone(), hook),
                language,
                launcher,
                state: Mutex::new(SandboxState::Unstarted),
                context: tokio::sync::Mutex::new(None),
                destroyed,
            }),
        }
    }

    pub fn language(&self) -> &str {
        &self.inner.language
    }

    pub fn state(&self) -> SandboxState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the isolated context if it does not exist yet
    #[instrument(skip(self), fields(language = %self.inner.language))]
    pub async fn initialize(&self) -> Result<(), SandboxError> {
        match self.state() {
            SandboxState::Destroyed => return Err(SandboxError::Destroyed),
            SandboxState::Ready | SandboxState::Executing => return Ok(()),
            SandboxState::Unstarted | SandboxState::Initializing => {}
        }
        let mut context = self.inner.context.lock().await;
        self.ensure_context(&mut context).await
    }

    /// Run one submission and return its aggregated output
    ///
    /// Overlapping calls on the same executor run one after another.
    #[instrument(skip(self, code), fields(language = %self.inner.language))]
    pub async fn execute(&self, code: &str) -> Result<ExecutionResult, SandboxError> {
        let mut context = self.inner.context.lock().await;
        self.ensure_context(&mut context).await?;
        let Some(endpoint) = context.as_mut() else {
            return Err(SandboxError::Destroyed);
        };

        let stale = endpoint.drain();
        if stale > 0 {
            debug!(stale, "discarded messages from a previous run");
        }
        self.inner.broker.reset();

        let rewrite = rewrite_calls(code, Syntax::JavaScript, BLOCKING_PROMPT, PROMPT_FUNCTION);
        debug!(
            literal_calls = rewrite.literal_calls,
            expression_calls = rewrite.expression_calls,
            "prompt calls rewritten"
        );

        self.transition(SandboxState::Executing);
        let mut output = OutputAggregator::new();
        let outcome = self.run(endpoint, rewrite.code, &mut output).await;
        self.inner.broker.reset();

        match outcome {
            RunOutcome::Completed => self.transition(SandboxState::Ready),
            RunOutcome::ContextLost => {
                warn!("sandbox context exited during a run");
                output.push(StreamKind::Stderr, "Sandbox context terminated unexpectedly");
                *context = None;
                self.transition(SandboxState::Unstarted);
            }
            RunOutcome::Destroyed => {
                debug!("run interrupted by destroy");
                *context = None;
            }
        }

        Ok(output.finish())
    }

    /// Deliver a value to the oldest pending input request
    pub fn provide_input(&self, value: impl Into<String>) -> bool {
        self.inner.broker.provide(value)
    }

    /// Release the context and resolve any in-flight run with its partial output
    pub fn destroy(&self) {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == SandboxState::Destroyed {
                return;
            }
            *state = SandboxState::Destroyed;
        }
        self.inner.destroyed.send_replace(true);
        self.inner.broker.reset();
        // When a run holds the lock it drops the context itself.
        if let Ok(mut context) = self.inner.context.try_lock() {
            *context = None;
        }
        debug!(language = %self.inner.language, "sandbox destroyed");
    }

    async fn ensure_context(&self, context: &mut Option<Context>) -> Result<(), SandboxError> {
        if *self.inner.destroyed.borrow() {
            return Err(SandboxError::Destroyed);
        }
        if context.as_ref().is_some_and(|endpoint| !endpoint.is_closed()) {
            return Ok(());
        }

        self.transition(SandboxState::Initializing);
        match self.inner.launcher.launch().await {
            Ok(endpoint) => {
                debug!(pid = ?endpoint.pid(), "sandbox context ready");
                *context = Some(endpoint);
                self.transition(SandboxState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to launch sandbox context");
                *context = None;
                self.transition(SandboxState::Unstarted);
                Err(e.into())
            }
        }
    }

    async fn run(
        &self,
        endpoint: &mut Context,
        code: String,
        output: &mut OutputAggregator,
    ) -> RunOutcome {
        if endpoint.send(HostMessage::ExecuteCode { code }).is_err() {
            return RunOutcome::ContextLost;
        }

        let mut destroyed = self.inner.destroyed.subscribe();
        let mut pending = VecDeque::new();

        loop {
            tokio::select! {
                biased;

                _ = destroyed.wait_for(|destroyed| *destroyed) => {
                    return RunOutcome::Destroyed;
                }

                message = endpoint.recv() => match message {
                    Some(SandboxMessage::Stdout { data }) => output.push(StreamKind::Stdout, &data),
                    Some(SandboxMessage::Stderr { data }) => output.push(StreamKind::Stderr, &data),
                    Some(SandboxMessage::InputRequest { message }) => {
                        pending.push_back(self.inner.broker.request(message));
                    }
                    Some(SandboxMessage::ExecutionComplete) => return RunOutcome::Completed,
                    None => return RunOutcome::ContextLost,
                },

                value = next_input(&mut pending), if !pending.is_empty() => {
                    let value = value.unwrap_or_default();
                    if endpoint.send(HostMessage::InputResponse { value }).is_err() {
                        return RunOutcome::ContextLost;
                    }
                }
            }
        }
    }

    /// Move to `to` unless the executor has already been destroyed
    fn transition(&self, to: SandboxState) {
        let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SandboxState::Destroyed {
            *state = to;
        }
    }
}

impl std::fmt::Debug for SandboxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxExecutor")
            .field("language", &self.inner.language)
            .field("state", &self.state())
            .finish()
    }
}
