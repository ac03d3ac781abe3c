//! Body of a worker thread
//!
//! The thread runs its own single-threaded runtime, owns the interpreter
//! context and relays messages between it and the host. Code is prepared for
//! the interpreter here, off the host's runtime.

use std::io;
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bridge::rewrite::{Syntax, rewrite_calls, scan_imports, wrap_async};
use crate::transport::{InterpreterRequest, RunMode, WorkerEvent, WorkerRequest};
use crate::worker::WorkerLauncher;

/// Async entry point the interpreter runs for submissions that read input
pub const ASYNC_ENTRY: &str = "__runnr_main__";

/// Awaitable input function installed in the interpreter
pub const ASYNC_INPUT: &str = "async_input";

const BLOCKING_INPUT: &str = "input";

/// Turn a submission into the interpreter's run request
///
/// Submissions calling `input(...)` have the calls rewritten to
/// `await async_input(...)` and are wrapped in an async entry point;
/// everything else runs as written.
pub fn prepare_run(code: &str) -> InterpreterRequest {
    let packages = scan_imports(code);
    let rewrite = rewrite_calls(code, Syntax::Python, BLOCKING_INPUT, ASYNC_INPUT);

    if rewrite.changed() {
        debug!(
            literal_calls = rewrite.literal_calls,
            expression_calls = rewrite.expression_calls,
            "input calls rewritten, running as coroutine"
        );
        InterpreterRequest::Run {
            code: wrap_async(&rewrite.code, ASYNC_ENTRY),
            mode: RunMode::Async,
            packages,
        }
    } else {
        InterpreterRequest::Run {
            code: code.to_owned(),
            mode: RunMode::Sync,
            packages,
        }
    }
}

/// Start the worker thread for `language`
pub(crate) fn spawn(
    language: &str,
    launcher: WorkerLauncher,
    requests: mpsc::UnboundedReceiver<WorkerRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> io::Result<JoinHandle<()>> {
    let label = language.to_owned();
    std::thread::Builder::new()
        .name(format!("runnr-worker-{language}"))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = events.send(WorkerEvent::Fault(format!(
                        "failed to start worker runtime: {e}"
                    )));
                    return;
                }
            };
            runtime.block_on(relay(label, launcher, requests, events));
        })
}

async fn relay(
    language: String,
    launcher: WorkerLauncher,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut interpreter = match launcher.launch().await {
        Ok(interpreter) => interpreter,
        Err(e) => {
            warn!(%language, error = %e, "failed to launch interpreter");
            let _ = events.send(WorkerEvent::Fault(e.to_string()));
            return;
        }
    };
    debug!(%language, pid = ?interpreter.pid(), "interpreter launched");

    loop {
        tokio::select! {
            request = requests.recv() => {
                let forwarded = match request {
                    Some(WorkerRequest::Run { code }) => interpreter.send(prepare_run(&code)),
                    Some(WorkerRequest::InputResponse { value }) => {
                        interpreter.send(InterpreterRequest::InputResponse { value })
                    }
                    Some(WorkerRequest::Terminate) | None => {
                        debug!(%language, "worker terminating");
                        return;
                    }
                };
                if forwarded.is_err() {
                    let _ = events.send(WorkerEvent::Fault("interpreter stopped accepting requests".to_owned()));
                    return;
                }
            }

            message = interpreter.recv() => match message {
                Some(message) => {
                    if events.send(WorkerEvent::Message(message)).is_err() {
                        return;
                    }
                }
                None => {
                    warn!(%language, "interpreter exited");
                    let _ = events.send(WorkerEvent::Fault("interpreter exited".to_owned()));
                    return;
                }
            },
        }
    }
}
