//! Compile-then-delegate execution backend
//!
//! A [`Compiler`] turns source into code for another language; the compiled
//! code is then run by a delegate sandbox. Without a delegate the backend
//! runs in compilation-only mode and reports the compiled code instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::sandbox::{SandboxError, SandboxExecutor};
use crate::types::{CompilationError, ExecutionResult};

mod command;

pub use command::{CommandCompiler, parse_diagnostic};

pub const EMPTY_SOURCE_MESSAGE: &str = "Error: Code cannot be empty";

/// Options forwarded to the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOptions {
    pub target: String,
    pub module: String,
    pub strict: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: "es2020".to_owned(),
            module: "es2020".to_owned(),
            strict: true,
        }
    }
}

/// Outcome of one compilation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompilationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CompilationError>,
}

impl CompilationResult {
    pub fn compiled(code: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(code.into()),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<CompilationError>) -> Self {
        Self {
            success: false,
            code: None,
            errors,
        }
    }
}

/// Source-to-source compiler
///
/// Malformed input is reported through [`CompilationResult`], never as an
/// error.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, source: &str, options: &CompilerOptions) -> CompilationResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Compiled code runs on the delegate
    FullExecution,
    /// No delegate attached; compiled code is returned as output
    CompilationOnly,
}

pub struct CompileExecutor {
    language: String,
    compiler: Arc<dyn Compiler>,
    options: CompilerOptions,
    delegate: Option<SandboxExecutor>,
}

impl CompileExecutor {
    pub fn new(
        language: impl Into<String>,
        compiler: Arc<dyn Compiler>,
        options: CompilerOptions,
    ) -> Self {
        Self {
            language: language.into(),
            compiler,
            options,
            delegate: None,
        }
    }

    pub fn with_delegate(mut self, delegate: SandboxExecutor) -> Self {
        self.attach_delegate(delegate);
        self
    }

    pub fn attach_delegate(&mut self, delegate: SandboxExecutor) {
        self.delegate = Some(delegate);
    }

    pub fn detach_delegate(&mut self) -> Option<SandboxExecutor> {
        self.delegate.take()
    }

    pub fn delegate(&self) -> Option<&SandboxExecutor> {
        self.delegate.as_ref()
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.delegate.is_some() {
            ExecutionMode::FullExecution
        } else {
            ExecutionMode::CompilationOnly
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Initialize the delegate, if any
    pub async fn initialize(&self) -> Result<(), SandboxError> {
        match &self.delegate {
            Some(delegate) => delegate.initialize().await,
            None => Ok(()),
        }
    }

    /// Compile without running
    pub async fn compile_only(&self, source: &str) -> CompilationResult {
        self.compiler.compile(source, &self.options).await
    }

    #[instrument(skip(self, source), fields(language = %self.language, mode = ?self.mode()))]
    pub async fn execute(&self, source: &str) -> Result<ExecutionResult, SandboxError> {
        if source.trim().is_empty() {
            return Ok(ExecutionResult::failure(EMPTY_SOURCE_MESSAGE));
        }

        let compiled = self.compile_only(source).await;
        let code = match compiled.code {
            Some(code) if compiled.success => code,
            _ => {
                debug!(errors = compiled.errors.len(), "compilation failed");
                let message = if compiled.errors.is_empty() {
                    "Unknown compilation error".to_owned()
                } else {
                    compiled
                        .errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                return Ok(ExecutionResult {
                    stdout: String::new(),
                    stderr: format!("Compilation failed:\n{message}"),
                    diagnostics: compiled.errors,
                });
            }
        };

        match &self.delegate {
            Some(delegate) => delegate.execute(&code).await,
            None => Ok(ExecutionResult::success(format!(
                "Successfully compiled to JavaScript:\n\n{}",
                code.trim()
            ))),
        }
    }

    pub fn provide_input(&self, value: impl Into<String>) -> bool {
        self.delegate
            .as_ref()
            .is_some_and(|delegate| delegate.provide_input(value))
    }

    pub fn destroy(&self) {
        if let Some(delegate) = &self.delegate {
            delegate.destroy();
        }
    }
}

impl std::fmt::Debug for CompileExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileExecutor")
            .field("language", &self.language)
            .field("mode", &self.mode())
            .finish()
    }
}
