//! Child-process contexts speaking newline-delimited JSON
//!
//! Each outbound message is written to the child's stdin as one JSON line;
//! each line the child prints on stdout is parsed as one inbound message.
//! The child's stderr is diagnostic only and goes to the log.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::transport::{Endpoint, Launcher, TransportError};

/// Resolve the program of a command to an absolute path via `PATH`
///
/// Programs already containing a `/` are left untouched. Symlinks are
/// canonicalized so the recorded path is the real executable.
pub fn resolve_command(command: &mut [String]) -> Result<(), TransportError> {
    let Some(first) = command.first_mut() else {
        return Err(TransportError::EmptyCommand);
    };

    if first.contains('/') {
        return Ok(());
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(&*first);
        if is_executable(&candidate) {
            *first = std::fs::canonicalize(&candidate)
                .unwrap_or(candidate)
                .to_string_lossy()
                .into_owned();
            return Ok(());
        }
    }

    Err(TransportError::CommandNotFound(first.clone()))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Launches a child process per context
pub struct ProcessLauncher<Tx, Rx> {
    label: String,
    command: Vec<String>,
    env: HashMap<String, String>,
    _messages: PhantomData<fn(Tx) -> Rx>,
}

impl<Tx, Rx> ProcessLauncher<Tx, Rx> {
    /// `label` names the context in logs (usually the language id)
    pub fn new(label: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            label: label.into(),
            command,
            env: HashMap::new(),
            _messages: PhantomData,
        }
    }

    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl<Tx, Rx> std::fmt::Debug for ProcessLauncher<Tx, Rx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLauncher")
            .field("label", &self.label)
            .field("program", &self.command.first())
            .finish()
    }
}

#[async_trait]
impl<Tx, Rx> Launcher<Tx, Rx> for ProcessLauncher<Tx, Rx>
where
    Tx: Serialize + Send + 'static,
    Rx: DeserializeOwned + Send + 'static,
{
    #[instrument(skip(self), fields(label = %self.label))]
    async fn launch(&self) -> Result<Endpoint<Tx, Rx>, TransportError> {
        let mut command = self.command.clone();
        resolve_command(&mut command)?;
        let program = command[0].clone();

        let mut child = Command::new(&program)
            .args(&command[1..])
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.clone(),
                source,
            })?;

        debug!(pid = ?child.id(), %program, "context process spawned");

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransportError::Closed);
        };

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Tx>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Rx>();

        let label = self.label.clone();
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(message) = out_rx.recv().await {
                let mut line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(%label, error = %e, "failed to encode message");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.flush().await
                }
                .await
                {
                    debug!(%label, error = %e, "context stdin closed");
                    break;
                }
            }
        });

        let label = self.label.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match serde_json::from_str::<Rx>(&line) {
                        Ok(message) => {
                            if in_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(%label, error = %e, %line, "skipping unparsable message"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%label, error = %e, "context stdout read error");
                        break;
                    }
                }
            }
            debug!(%label, "context stdout closed");
        });

        let label = self.label.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(%label, %line, "context stderr");
            }
        });

        Ok(Endpoint::new(out_tx, in_rx).with_child(child))
    }
}
