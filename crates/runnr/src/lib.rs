//! A multi-language code runner.
//!
//! Runnr provides an async Rust API for running snippets of code in several
//! languages behind one facade. Each language is served by one of four
//! backends, and running code can ask the caller for input while it runs.
//!
//! # Features
//!
//! - **Sandboxed contexts** — Scripting languages run in a fresh isolated context per run.
//! - **Warm workers** — Interpreters with a slow start live on a background worker thread and are reused.
//! - **Compile-then-delegate** — Source-to-source compilers feed their output to a sandbox language.
//! - **Toolchains** — Ahead-of-time compiled languages build and run in a scratch directory.
//! - **Interactive input** — `prompt()` and `input()` calls are routed to a host callback.
//! - **TOML configuration** — Flexible per-language backend settings.

pub use bridge::{InputBroker, InputCallback, InputHook, OutputAggregator};
pub use compile::{CompilationResult, Compiler, CompilerOptions, ExecutionMode};
pub use config::{BackendKind, Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use runner::{Executor, ExecutorError, RunError, Runnr, RunnrBuilder};
pub use toolchain::{BytecodeToolchain, ToolchainArtifacts, ToolchainError, ToolchainOutput};
pub use transport::{Endpoint, Launcher, TransportError};
pub use types::{CompilationError, ExecutionRequest, ExecutionResult, InputRequest, StreamKind};
pub use worker::{WorkerError, WorkerRegistry, WorkerStatus};

pub mod bridge;
pub mod compile;
pub mod config;
pub mod runner;
pub mod sandbox;
pub mod toolchain;
pub mod transport;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_support;
