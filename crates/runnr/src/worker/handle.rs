//! Host side of a worker thread

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, warn};

use crate::bridge::input::next_input;
use crate::bridge::{InputBroker, OutputAggregator};
use crate::transport::{WorkerEvent, WorkerMessage, WorkerRequest};
use crate::types::{ExecutionResult, StreamKind};
use crate::worker::{WorkerError, WorkerLauncher, thread};

/// A running worker, ready to accept runs
///
/// Dropping the handle asks the worker thread to stop, which in turn drops
/// (and kills) the interpreter.
pub struct WorkerHandle {
    language: String,
    requests: mpsc::UnboundedSender<WorkerRequest>,
    /// Holding this lock is what serializes runs
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkerEvent>>,
    alive: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Start a worker thread and wait until its interpreter reports readiness
    #[instrument(skip(launcher))]
    pub async fn spawn(
        language: String,
        launcher: WorkerLauncher,
        ready_timeout: Duration,
    ) -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let thread = thread::spawn(&language, launcher, request_rx, event_tx).map_err(|e| {
            WorkerError::Thread {
                language: language.clone(),
                reason: e.to_string(),
            }
        })?;

        let handle = Self {
            language,
            requests: request_tx,
            events: tokio::sync::Mutex::new(event_rx),
            alive: AtomicBool::new(true),
            thread: Mutex::new(Some(thread)),
        };

        let ready = tokio::time::timeout(ready_timeout, handle.wait_ready()).await;
        match ready {
            Ok(Ok(())) => {
                debug!(language = %handle.language, "worker ready");
                Ok(handle)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(WorkerError::ReadyTimeout {
                language: handle.language.clone(),
                timeout: ready_timeout,
            }),
        }
    }

    async fn wait_ready(&self) -> Result<(), WorkerError> {
        let mut events = self.events.lock().await;
        loop {
            match events.recv().await {
                Some(WorkerEvent::Message(WorkerMessage::Ready)) => return Ok(()),
                Some(WorkerEvent::Message(message)) => {
                    warn!(language = %self.language, ?message, "message before ready ignored");
                }
                Some(WorkerEvent::Fault(reason)) => {
                    return Err(WorkerError::Startup {
                        language: self.language.clone(),
                        reason,
                    });
                }
                None => {
                    return Err(WorkerError::Startup {
                        language: self.language.clone(),
                        reason: "worker thread exited".to_owned(),
                    });
                }
            }
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.requests.is_closed()
    }

    /// Run one submission on the worker
    ///
    /// Runs on the same worker are serialized. When `cancel` flips to `true`
    /// the worker is terminated and the partial output is returned.
    #[instrument(skip(self, code, broker, cancel), fields(language = %self.language))]
    pub async fn execute(
        &self,
        code: &str,
        broker: &InputBroker,
        cancel: &mut watch::Receiver<bool>,
    ) -> ExecutionResult {
        let mut events = self.events.lock().await;
        while let Ok(event) = events.try_recv() {
            debug!(?event, "discarding event from a previous run");
        }

        let mut output = OutputAggregator::new();
        broker.reset();

        if !self.is_alive()
            || self
                .requests
                .send(WorkerRequest::Run {
                    code: code.to_owned(),
                })
                .is_err()
        {
            self.mark_dead();
            output.push(StreamKind::Stderr, "Worker crashed: worker is not running");
            return output.finish();
        }

        let mut pending = VecDeque::new();
        loop {
            tokio::select! {
                biased;

                Ok(_) = cancel.wait_for(|cancelled| *cancelled) => {
                    debug!("run cancelled, terminating worker");
                    self.terminate();
                    break;
                }

                event = events.recv() => match event {
                    Some(WorkerEvent::Message(message)) => match message {
                        WorkerMessage::Stdout { data } => output.push(StreamKind::Stdout, &data),
                        WorkerMessage::Stderr { data } => output.push(StreamKind::Stderr, &data),
                        WorkerMessage::InputRequest { prompt } => {
                            pending.push_back(broker.request(prompt));
                        }
                        WorkerMessage::Done => break,
                        WorkerMessage::Error { data } => {
                            output.push(StreamKind::Stderr, &data);
                            break;
                        }
                        WorkerMessage::Ready => debug!("redundant ready message"),
                    },
                    Some(WorkerEvent::Fault(reason)) => {
                        warn!(%reason, "worker crashed during a run");
                        self.mark_dead();
                        output.push(StreamKind::Stderr, &format!("Worker crashed: {reason}"));
                        break;
                    }
                    None => {
                        warn!("worker thread went away during a run");
                        self.mark_dead();
                        output.push(StreamKind::Stderr, "Worker crashed: worker thread exited");
                        break;
                    }
                },

                value = next_input(&mut pending), if !pending.is_empty() => {
                    let value = value.unwrap_or_default();
                    if self.requests.send(WorkerRequest::InputResponse { value }).is_err() {
                        self.mark_dead();
                        output.push(StreamKind::Stderr, "Worker crashed: worker thread exited");
                        break;
                    }
                }
            }
        }

        broker.reset();
        output.finish()
    }

    /// Ask the worker thread to stop
    pub fn terminate(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            let _ = self.requests.send(WorkerRequest::Terminate);
            debug!(language = %self.language, "worker terminated");
        }
    }

    /// Stop the worker thread and wait for it to finish
    pub fn join(&self) {
        self.terminate();
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread
            && thread.join().is_err()
        {
            warn!(language = %self.language, "worker thread panicked");
        }
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("language", &self.language)
            .field("alive", &self.is_alive())
            .finish()
    }
}
