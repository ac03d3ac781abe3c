//! Process-wide registry of warm workers, one per language

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, instrument, warn};

use crate::worker::{WorkerError, WorkerHandle, WorkerLauncher};

type Initialization = Shared<BoxFuture<'static, Result<Arc<WorkerHandle>, WorkerError>>>;

enum WorkerSlot {
    Initializing(Initialization),
    Ready(Arc<WorkerHandle>),
    Failed(WorkerError),
}

/// Observable lifecycle of a language's worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Uninitialized,
    Initializing,
    Ready,
    /// The last initialization failed; the next acquire retries
    Failed(WorkerError),
}

/// Registry handing out the shared worker of each language
///
/// Concurrent first callers share one initialization. A failed
/// initialization is remembered until the next call retries it, and a
/// worker that died is replaced on the next call.
#[derive(Default)]
pub struct WorkerRegistry {
    slots: Mutex<HashMap<String, WorkerSlot>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the ready worker for `language`, starting one if needed
    #[instrument(skip(self, launcher))]
    pub async fn acquire(
        &self,
        language: &str,
        launcher: WorkerLauncher,
        ready_timeout: Duration,
    ) -> Result<Arc<WorkerHandle>, WorkerError> {
        let initialization = {
            let mut slots = self.lock();
            match slots.get(language) {
                Some(WorkerSlot::Ready(handle)) if handle.is_alive() => return Ok(handle.clone()),
                Some(WorkerSlot::Initializing(initialization)) => {
                    debug!("joining in-flight initialization");
                    initialization.clone()
                }
                slot => {
                    match slot {
                        Some(WorkerSlot::Ready(_)) => debug!("replacing dead worker"),
                        Some(WorkerSlot::Failed(e)) => debug!(previous = %e, "retrying failed initialization"),
                        _ => debug!("starting worker"),
                    }
                    let initialization = WorkerHandle::spawn(language.to_owned(), launcher, ready_timeout)
                        .map(|result| result.map(Arc::new))
                        .boxed()
                        .shared();
                    slots.insert(
                        language.to_owned(),
                        WorkerSlot::Initializing(initialization.clone()),
                    );
                    initialization
                }
            }
        };

        let result = initialization.clone().await;

        let mut slots = self.lock();
        if let Some(WorkerSlot::Initializing(current)) = slots.get(language)
            && current.ptr_eq(&initialization)
        {
            let slot = match &result {
                Ok(handle) => WorkerSlot::Ready(handle.clone()),
                Err(e) => {
                    warn!(error = %e, "worker initialization failed");
                    WorkerSlot::Failed(e.clone())
                }
            };
            slots.insert(language.to_owned(), slot);
        }
        result
    }

    pub fn status(&self, language: &str) -> WorkerStatus {
        match self.lock().get(language) {
            None => WorkerStatus::Uninitialized,
            Some(WorkerSlot::Initializing(_)) => WorkerStatus::Initializing,
            Some(WorkerSlot::Ready(handle)) if handle.is_alive() => WorkerStatus::Ready,
            Some(WorkerSlot::Ready(_)) => WorkerStatus::Uninitialized,
            Some(WorkerSlot::Failed(e)) => WorkerStatus::Failed(e.clone()),
        }
    }

    /// Stop and forget the worker of `language`, returning whether one existed
    pub fn shutdown(&self, language: &str) -> bool {
        let removed = self.lock().remove(language);
        if let Some(WorkerSlot::Ready(handle)) = &removed {
            handle.terminate();
        }
        if removed.is_some() {
            debug!(%language, "worker shut down");
        }
        removed.is_some()
    }

    /// Stop and forget every worker
    pub fn shutdown_all(&self) {
        let slots: Vec<_> = self.lock().drain().collect();
        for (language, slot) in slots {
            if let WorkerSlot::Ready(handle) = slot {
                handle.terminate();
            }
            debug!(%language, "worker shut down");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WorkerSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<String> = self.lock().keys().cloned().collect();
        languages.sort();
        f.debug_struct("WorkerRegistry")
            .field("languages", &languages)
            .finish()
    }
}
