//! Input request brokering
//!
//! Running code asks for input with a fire-and-forget notification. The broker
//! turns each notification into a single-use resolver, tells the host through
//! the registered [`InputHook`], and resolves requests in FIFO order as values
//! arrive through [`InputBroker::provide`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::types::InputRequest;

/// Host-side handler invoked whenever running code asks for input
pub type InputCallback = Arc<dyn Fn(InputRequest) + Send + Sync>;

/// Slot holding the single host-registered input callback
///
/// Cloning shares the slot, so a callback registered after a broker was
/// created is still the one that broker notifies.
#[derive(Clone, Default)]
pub struct InputHook {
    slot: Arc<RwLock<Option<InputCallback>>>,
}

impl InputHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback, replacing any previous one
    pub fn set(&self, callback: InputCallback) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Remove the registered callback
    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_set(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn current(&self) -> Option<InputCallback> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for InputHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputHook")
            .field("registered", &self.is_set())
            .finish()
    }
}

/// Bridges input requests from one executor to the host
#[derive(Debug)]
pub struct InputBroker {
    language: String,
    hook: InputHook,
    pending: Mutex<VecDeque<oneshot::Sender<String>>>,
}

impl InputBroker {
    pub fn new(language: impl Into<String>, hook: InputHook) -> Self {
        Self {
            language: language.into(),
            hook,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Register an input request and notify the host
    ///
    /// The returned receiver resolves exactly once with the provided value. With
    /// no host callback registered it resolves immediately with an empty string.
    pub fn request(&self, message: impl Into<String>) -> oneshot::Receiver<String> {
        let message = message.into();
        let (tx, rx) = oneshot::channel();

        let Some(callback) = self.hook.current() else {
            warn!(language = %self.language, %message, "input requested with no handler registered");
            let _ = tx.send(String::new());
            return rx;
        };

        let queued = {
            let mut pending = self.lock_pending();
            pending.push_back(tx);
            pending.len()
        };
        debug!(language = %self.language, queued, "input requested");

        callback(InputRequest {
            language: self.language.clone(),
            message,
        });
        rx
    }

    /// Resolve the oldest pending request
    ///
    /// Returns `false` (and drops the value) when nothing is pending.
    pub fn provide(&self, value: impl Into<String>) -> bool {
        let mut value = value.into();
        let mut pending = self.lock_pending();
        while let Some(tx) = pending.pop_front() {
            match tx.send(value) {
                Ok(()) => return true,
                // The run that asked is gone; offer the value to the next one.
                Err(unsent) => value = unsent,
            }
        }
        debug!(language = %self.language, "input provided with no pending request");
        false
    }

    /// Number of requests awaiting a value
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Drop every pending resolver, returning how many were dropped
    pub fn reset(&self) -> usize {
        let mut pending = self.lock_pending();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<oneshot::Sender<String>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Await the oldest pending input receiver and pop it
///
/// Must only be polled while `pending` is non-empty.
pub(crate) async fn next_input(
    pending: &mut VecDeque<oneshot::Receiver<String>>,
) -> Option<String> {
    let front = pending.front_mut()?;
    let value = front.await.ok();
    pending.pop_front();
    value
}
