//! Bounded background execution for research runs.

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Spawns research runs as tokio tasks, at most `capacity` running at once.
///
/// Each submitted task waits for a permit inside its own spawned task, so
/// [`submit`](Self::submit) returns immediately regardless of load.
pub struct ResearchWorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ResearchWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchWorkerPool")
            .field("capacity", &self.capacity)
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}

impl ResearchWorkerPool {
    /// Create a pool running at most `capacity` tasks concurrently (min 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Maximum concurrent tasks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a running task
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Submitted tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        let mut handles = self.lock_handles();
        handles.retain(|h| !h.is_finished());
        handles.len()
    }

    /// Queue `task` for execution.
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(error = %e, "Worker pool closed, dropping research task");
                    return;
                }
            };
            task.await;
        });

        let mut handles = self.lock_handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        debug!(in_flight = handles.len(), capacity = self.capacity, "Research task submitted");
    }

    /// Run `task` to completion on the caller's task, holding a permit.
    ///
    /// Shares the bound with [`submit`](Self::submit), so blocking runs and
    /// background runs together never exceed `capacity`.
    pub async fn run<F>(&self, task: F)
    where
        F: Future<Output = ()>,
    {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(error = %e, "Worker pool closed, dropping research task");
                return;
            }
        };
        task.await;
    }

    /// Wait for every task submitted so far to finish.
    pub async fn drain(&self) {
        let handles = std::mem::take(&mut *self.lock_handles());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Research task panicked");
            }
        }
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ResearchWorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}
