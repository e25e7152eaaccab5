//! Worker lifecycle tracking.
//!
//! # Responsibilities
//! - Count outstanding workers
//! - Hand out one [`WorkerHandle`] per registration
//! - Let the coordinator wait, without polling, until every worker has exited
//!
//! # Design Decisions
//! - Completing consumes the handle; a second completion does not compile
//! - Dropping an uncompleted handle completes it, so panics cannot leak a count
//! - Every release is checked against the live set and unknown ids are reported

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;

/// Opaque identity of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Contract violations on the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("{0} is not registered (already completed or never registered)")]
    UnknownWorker(WorkerId),
}

#[derive(Debug)]
struct TrackerInner {
    next_id: AtomicU64,
    live: DashMap<WorkerId, String>,
    outstanding: watch::Sender<usize>,
}

/// Counts outstanding workers.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    inner: Arc<TrackerInner>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(TrackerInner {
                next_id: AtomicU64::new(1),
                live: DashMap::new(),
                outstanding,
            }),
        }
    }

    /// Register a worker. Call before launching it.
    pub fn register(&self, name: impl Into<String>) -> WorkerHandle {
        let id = WorkerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();

        self.inner.live.insert(id, name.clone());
        self.inner.outstanding.send_modify(|count| *count += 1);
        metrics::gauge!("workers_live").increment(1.0);

        tracing::trace!(worker_id = %id, worker = %name, "Worker registered");
        WorkerHandle {
            id,
            name,
            tracker: self.clone(),
            completed: false,
        }
    }

    /// Number of registered workers that have not completed.
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Ids and names of workers that have not completed.
    pub fn live_workers(&self) -> Vec<(WorkerId, String)> {
        let mut live: Vec<_> = self
            .inner
            .live
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live
    }

    /// Wait until the outstanding count is zero.
    pub async fn wait(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    fn release(&self, id: WorkerId) -> Result<(), TrackerError> {
        let Some((_, name)) = self.inner.live.remove(&id) else {
            tracing::error!(worker_id = %id, "Completion for a worker that is not registered");
            return Err(TrackerError::UnknownWorker(id));
        };

        self.inner.outstanding.send_modify(|count| *count -= 1);
        metrics::gauge!("workers_live").decrement(1.0);

        tracing::trace!(worker_id = %id, worker = %name, "Worker completed");
        Ok(())
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One registration in a [`CompletionTracker`].
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    name: String,
    tracker: CompletionTracker,
    completed: bool,
}

impl WorkerHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Report that the worker has exited.
    pub fn complete(mut self) -> Result<(), TrackerError> {
        self.completed = true;
        self.tracker.release(self.id)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if !self.completed {
            self.completed = true;
            let _ = self.tracker.release(self.id);
        }
    }
}
