//! Message transport between the host and an isolated execution context
//!
//! An [`Endpoint`] is a bidirectional, ordered message channel to one isolated
//! context. Contexts are created through a [`Launcher`]; the production
//! launcher ([`ProcessLauncher`]) speaks newline-delimited JSON with a child
//! process, while tests wire an in-memory [`Endpoint::pair`].

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::mpsc;

pub mod process;
pub mod protocol;

pub use process::{ProcessLauncher, resolve_command};
pub use protocol::{
    HostMessage, InterpreterRequest, RunMode, SandboxMessage, WorkerEvent, WorkerMessage,
    WorkerRequest,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("empty command")]
    EmptyCommand,

    #[error("command '{0}' not found in PATH")]
    CommandNotFound(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("context closed")]
    Closed,
}

/// Creates isolated contexts speaking `Tx`/`Rx` messages
#[async_trait]
pub trait Launcher<Tx, Rx>: Send + Sync {
    async fn launch(&self) -> Result<Endpoint<Tx, Rx>, TransportError>;
}

/// Host side of one isolated context
///
/// Dropping the endpoint closes the outbound channel and, when the context is
/// a child process, kills it.
pub struct Endpoint<Tx, Rx> {
    tx: mpsc::UnboundedSender<Tx>,
    rx: mpsc::UnboundedReceiver<Rx>,
    child: Option<Child>,
}

impl<Tx, Rx> Endpoint<Tx, Rx> {
    pub fn new(tx: mpsc::UnboundedSender<Tx>, rx: mpsc::UnboundedReceiver<Rx>) -> Self {
        Self {
            tx,
            rx,
            child: None,
        }
    }

    /// Tie the lifetime of a child process to this endpoint
    pub fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }

    /// Two connected in-memory endpoints
    pub fn pair() -> (Endpoint<Tx, Rx>, Endpoint<Rx, Tx>) {
        let (host_tx, context_rx) = mpsc::unbounded_channel();
        let (context_tx, host_rx) = mpsc::unbounded_channel();
        (
            Endpoint::new(host_tx, host_rx),
            Endpoint::new(context_tx, context_rx),
        )
    }

    /// Post a message to the other side
    pub fn send(&self, message: Tx) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }

    /// Next message from the other side; `None` once it has gone away
    pub async fn recv(&mut self) -> Option<Rx> {
        self.rx.recv().await
    }

    /// Discard messages that are already queued, returning how many
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// OS process id of the backing child, if any
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}

impl<Tx, Rx> fmt::Debug for Endpoint<Tx, Rx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("closed", &self.tx.is_closed())
            .field("pid", &self.pid())
            .finish()
    }
}
