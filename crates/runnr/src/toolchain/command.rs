//! Toolchain driven by configured compile and run commands
//!
//! Every run gets a fresh scratch directory holding the source file and the
//! compiled artifact; it is removed when the run ends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::{CompileConfig, Language, RunConfig};
use crate::toolchain::{BytecodeToolchain, ToolchainArtifacts, ToolchainError, ToolchainOutput};
use crate::transport::resolve_command;

#[derive(Debug, Clone)]
struct Prepared {
    /// Program name as configured → resolved absolute path
    programs: HashMap<String, String>,
    libraries: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct CommandToolchain {
    language: String,
    compile: CompileConfig,
    run: RunConfig,
    work_dir: Option<PathBuf>,
    prepared: Mutex<Option<Prepared>>,
}

impl CommandToolchain {
    pub fn new(language: impl Into<String>, compile: CompileConfig, run: RunConfig) -> Self {
        Self {
            language: language.into(),
            compile,
            run,
            work_dir: None,
            prepared: Mutex::new(None),
        }
    }

    /// Create scratch directories under `dir` instead of the system temp dir
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Artifacts this toolchain's commands need
    ///
    /// Commands whose program is a placeholder (such as `{binary}`) need no
    /// resolution.
    pub fn artifacts(&self) -> ToolchainArtifacts {
        let mut programs = Vec::new();
        for command in [&self.compile.command, &self.run.command] {
            if let Some(program) = command.first()
                && !program.contains('{')
                && !programs.contains(program)
            {
                programs.push(program.clone());
            }
        }
        ToolchainArtifacts {
            programs,
            libraries: self.compile.libraries.iter().map(PathBuf::from).collect(),
        }
    }

    fn prepared(&self) -> Result<Prepared, ToolchainError> {
        self.prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ToolchainError::NotInitialized)
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, ToolchainError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("runnr-");
        let dir = match &self.work_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn mentions_missing_entry(&self, text: &str) -> bool {
        self.run
            .missing_entry_markers
            .iter()
            .any(|marker| text.contains(marker.as_str()))
    }
}

#[async_trait]
impl BytecodeToolchain for CommandToolchain {
    #[instrument(skip(self, artifacts), fields(language = %self.language))]
    async fn initialize(&self, artifacts: &ToolchainArtifacts) -> Result<(), ToolchainError> {
        if self
            .prepared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return Ok(());
        }

        let mut programs = HashMap::new();
        for program in &artifacts.programs {
            let mut command = vec![program.clone()];
            resolve_command(&mut command)
                .map_err(|_| ToolchainError::MissingProgram(program.clone()))?;
            debug!(%program, resolved = %command[0], "toolchain program resolved");
            programs.insert(program.clone(), command.swap_remove(0));
        }

        let mut libraries = Vec::new();
        for library in &artifacts.libraries {
            if !library.exists() {
                return Err(ToolchainError::MissingLibrary(library.clone()));
            }
            libraries.push(std::fs::canonicalize(library)?);
        }

        *self.prepared.lock().unwrap_or_else(PoisonError::into_inner) = Some(Prepared {
            programs,
            libraries,
        });
        debug!("toolchain initialized");
        Ok(())
    }

    #[instrument(skip(self, source), fields(language = %self.language))]
    async fn compile_and_run(&self, source: &str) -> Result<ToolchainOutput, ToolchainError> {
        let prepared = self.prepared()?;
        let scratch = self.scratch_dir()?;
        let dir = scratch.path();

        let source_path = dir.join(&self.compile.source_name);
        let output_path = dir.join(&self.compile.output_name);
        tokio::fs::write(&source_path, source).await?;

        let libs = std::env::join_paths(
            std::iter::once(PathBuf::from(".")).chain(prepared.libraries.iter().cloned()),
        )
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let source_arg = source_path.to_string_lossy();
        let output_arg = output_path.to_string_lossy();
        let dir_arg = dir.to_string_lossy();
        let libs_arg = libs.to_string_lossy();
        let placeholders = [
            ("{source}", &*source_arg),
            ("{output}", &*output_arg),
            ("{binary}", &*output_arg),
            ("{dir}", &*dir_arg),
            ("{libs}", &*libs_arg),
        ];

        let compile_command = Language::expand_command(&self.compile.command, &placeholders);
        let compiled = run_command(
            &compile_command,
            &prepared.programs,
            &self.compile.env,
            dir,
        )
        .await?;

        if !compiled.status.success() {
            let details = combined_output(&compiled);
            debug!(status = %compiled.status, "compilation failed");
            return Err(if self.mentions_missing_entry(&details) {
                ToolchainError::MissingEntryPoint(details)
            } else {
                ToolchainError::Compile(details)
            });
        }
        if !output_path.exists() {
            return Err(ToolchainError::Compile(format!(
                "compiler produced no {}",
                self.compile.output_name
            )));
        }

        let run_command_line = Language::expand_command(&self.run.command, &placeholders);
        let ran = run_command(&run_command_line, &prepared.programs, &self.run.env, dir).await?;

        let stdout = String::from_utf8_lossy(&ran.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&ran.stderr).into_owned();
        if !ran.status.success() && self.mentions_missing_entry(&stderr) {
            return Err(ToolchainError::MissingEntryPoint(stderr.trim().to_owned()));
        }

        debug!(status = %ran.status, "program finished");
        Ok(ToolchainOutput {
            stdout,
            stderr,
            exit_code: ran.status.code(),
        })
    }
}

async fn run_command(
    command: &[String],
    programs: &HashMap<String, String>,
    env: &HashMap<String, String>,
    dir: &Path,
) -> Result<Output, ToolchainError> {
    let Some((program, args)) = command.split_first() else {
        return Err(ToolchainError::MissingProgram(String::new()));
    };
    let program = programs.get(program).unwrap_or(program);
    debug!(%program, ?args, "running toolchain command");

    let output = Command::new(program)
        .args(args)
        .envs(env)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    Ok(output)
}

fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut combined = stdout.trim().to_owned();
    if !combined.is_empty() && !stderr.trim().is_empty() {
        combined.push('\n');
    }
    combined.push_str(stderr.trim());
    if combined.is_empty() {
        combined = format!("compiler exited with {}", output.status);
    }
    combined
}
