//! Compiler driven by an external command
//!
//! The source is written to the command's stdin and the compiled code is read
//! from its stdout. On failure every non-blank stderr line becomes one
//! diagnostic.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::compile::{CompilationResult, Compiler, CompilerOptions};
use crate::config::{Language, TranspileConfig};
use crate::transport::resolve_command;
use crate::types::CompilationError;

#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: Vec<String>,
    env: HashMap<String, String>,
}

impl CommandCompiler {
    /// `command` may use `{target}`, `{module}` and `{strict}` placeholders
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            env: HashMap::new(),
        }
    }

    pub fn from_config(config: &TranspileConfig) -> Self {
        Self {
            command: config.command.clone(),
            env: config.env.clone(),
        }
    }

    fn expand(&self, options: &CompilerOptions) -> Vec<String> {
        let strict = options.strict.to_string();
        Language::expand_command(
            &self.command,
            &[
                ("{target}", options.target.as_str()),
                ("{module}", options.module.as_str()),
                ("{strict}", strict.as_str()),
            ],
        )
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    #[instrument(skip(self, source))]
    async fn compile(&self, source: &str, options: &CompilerOptions) -> CompilationResult {
        let mut command = self.expand(options);
        if let Err(e) = resolve_command(&mut command) {
            return CompilationResult::failed(vec![CompilationError::new(format!(
                "Compiler unavailable: {e}"
            ))]);
        }
        debug!(?command, "running compiler");

        let mut child = match Command::new(&command[0])
            .args(&command[1..])
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CompilationResult::failed(vec![CompilationError::new(format!(
                    "Compiler unavailable: {e}"
                ))]);
            }
        };

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(source.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return CompilationResult::failed(vec![CompilationError::new(format!(
                    "Compilation error: {e}"
                ))]);
            }
        };
        if let Err(e) = written {
            warn!(error = %e, "compiler did not read the whole source");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let mut errors: Vec<CompilationError> = stderr
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(parse_diagnostic)
                .collect();
            if errors.is_empty() {
                errors.push(CompilationError::new(format!(
                    "Compiler exited with {}",
                    output.status
                )));
            }
            return CompilationResult::failed(errors);
        }

        if stdout.trim().is_empty() && !source.trim().is_empty() {
            return CompilationResult::failed(vec![CompilationError::new(
                "Compilation failed: No output generated",
            )]);
        }

        CompilationResult::compiled(stdout.into_owned())
    }
}

/// Build a diagnostic from one compiler output line
///
/// A `:<line>:<column>` location anywhere in the line (as in
/// `<stdin>:3:14: ERROR: ...`) fills in the position.
pub fn parse_diagnostic(line: &str) -> CompilationError {
    let mut diagnostic = CompilationError::new(line);
    let parts: Vec<&str> = line.split(':').collect();
    for window in parts.windows(2) {
        if let (Ok(line), Ok(column)) = (
            window[0].trim().parse::<u32>(),
            window[1].trim().parse::<u32>(),
        ) {
            diagnostic.line = Some(line);
            diagnostic.column = Some(column);
            break;
        }
    }
    diagnostic
}
