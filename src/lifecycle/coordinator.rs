//! Shutdown coordination.
//!
//! # Responsibilities
//! - Launch workers against the shared cancellation signal
//! - Drive `Running → SignalReceived → Draining → Stopped`
//! - Apply the grace period to the listening service drain
//! - Report whether shutdown was clean or forced
//!
//! # Design Decisions
//! - `run` consumes the coordinator: every phase is entered at most once
//! - The deadline starts when draining starts, not at process start
//! - Workers are never forced; only service connections can be cut

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::ShutdownConfig;
use crate::lifecycle::cancel::{CancellationSignal, Cancelled};
use crate::lifecycle::tracker::{CompletionTracker, WorkerId};
use crate::service::{DrainOutcome, ListeningService, ServiceError};
use crate::worker::{Worker, WorkerReport};

/// Coordinator state. Ordered: transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownPhase {
    Running,
    SignalReceived,
    Draining,
    Stopped,
}

/// How shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All workers exited and every service connection finished.
    Clean,
    /// Service connections were cut by the deadline or a repeated signal.
    Forced,
}

impl ShutdownOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownOutcome::Clean => "clean",
            ShutdownOutcome::Forced => "forced",
        }
    }
}

/// Summary returned once the coordinator reaches [`ShutdownPhase::Stopped`].
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub outcome: ShutdownOutcome,
    /// `None` when no listening service was attached.
    pub service: Option<DrainOutcome>,
    pub workers: Vec<WorkerReport>,
    /// Time spent in the draining phase.
    pub drain_elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("listening service failed to start: {0}")]
    Service(#[from] ServiceError),
}

/// Top-level shutdown orchestration.
pub struct ShutdownCoordinator {
    shutdown: CancellationSignal,
    escalation: CancellationSignal,
    config: ShutdownConfig,
    tracker: CompletionTracker,
    service: Option<Arc<dyn ListeningService>>,
    workers: JoinSet<WorkerReport>,
    phase: watch::Sender<ShutdownPhase>,
}

impl ShutdownCoordinator {
    /// `shutdown` starts the sequence; `escalation` forces the service closed.
    pub fn new(shutdown: CancellationSignal, escalation: CancellationSignal, config: ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            shutdown,
            escalation,
            config,
            tracker: CompletionTracker::new(),
            service: None,
            workers: JoinSet::new(),
            phase,
        }
    }

    pub fn with_service(mut self, service: Arc<dyn ListeningService>) -> Self {
        self.set_service(service);
        self
    }

    pub fn set_service(&mut self, service: Arc<dyn ListeningService>) {
        self.service = Some(service);
    }

    /// Register and launch a worker.
    ///
    /// A worker launched after the signal fired exits on its first check.
    pub fn spawn_worker(&mut self, worker: Worker) -> WorkerId {
        let handle = self.tracker.register(worker.name());
        let id = handle.id();
        if self.shutdown.is_fired() {
            tracing::debug!(worker = %worker.name(), "Worker launched after shutdown started");
        }
        self.workers.spawn(worker.run(self.shutdown.observe(), handle));
        id
    }

    /// Tracker shared with workers launched outside the coordinator.
    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    pub fn shutdown_signal(&self) -> &CancellationSignal {
        &self.shutdown
    }

    pub fn phase(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Run until shutdown completes.
    pub async fn run(mut self) -> Result<ShutdownReport, CoordinatorError> {
        if let Some(service) = &self.service {
            if let Err(err) = service.listen().await {
                tracing::error!(error = %err, "Listening service failed to start, stopping workers");
                self.shutdown.fire();
                collect_workers(std::mem::take(&mut self.workers), &self.tracker).await;
                self.advance(ShutdownPhase::Stopped);
                return Err(err.into());
            }
        }

        tracing::info!(
            workers = self.tracker.outstanding(),
            service = self.service.is_some(),
            "Running"
        );

        self.shutdown.observe().fired().await;
        self.advance(ShutdownPhase::SignalReceived);
        tracing::info!("Shutdown signal received, no new work will be accepted");

        if let Some(service) = &self.service {
            service.stop_accepting().await;
        }

        self.advance(ShutdownPhase::Draining);
        let started = Instant::now();
        let deadline = started + self.config.grace_period();
        tracing::info!(
            grace_period_ms = self.config.grace_period_ms,
            outstanding_workers = self.tracker.outstanding(),
            in_flight_requests = self.service.as_ref().map_or(0, |s| s.in_flight()),
            "Draining"
        );

        let service = self.service.clone();
        let escalation = self.escalation.observe();
        let service_drain = async move {
            match service {
                Some(service) => Some(drain_service(service.as_ref(), deadline, escalation).await),
                None => None,
            }
        };
        let workers = std::mem::take(&mut self.workers);
        let (service_outcome, workers) =
            tokio::join!(service_drain, collect_workers(workers, &self.tracker));

        let drain_elapsed = started.elapsed();
        let outcome = match service_outcome {
            Some(drain) if drain.is_forced() => ShutdownOutcome::Forced,
            _ => ShutdownOutcome::Clean,
        };

        self.advance(ShutdownPhase::Stopped);
        metrics::counter!("shutdown_total", "outcome" => outcome.as_str()).increment(1);

        match outcome {
            ShutdownOutcome::Clean => tracing::info!(
                workers = workers.len(),
                drain_elapsed_ms = drain_elapsed.as_millis() as u64,
                "Shutdown complete"
            ),
            ShutdownOutcome::Forced => tracing::warn!(
                workers = workers.len(),
                drain_elapsed_ms = drain_elapsed.as_millis() as u64,
                ?service_outcome,
                "Shutdown forced"
            ),
        }

        Ok(ShutdownReport {
            outcome,
            service: service_outcome,
            workers,
            drain_elapsed,
        })
    }

    fn advance(&self, next: ShutdownPhase) {
        let moved = self.phase.send_if_modified(|phase| {
            if next > *phase {
                *phase = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(phase = ?next, "Shutdown phase changed");
        }
    }
}

/// Wait for every launched worker, then for any externally registered one.
async fn collect_workers(mut workers: JoinSet<WorkerReport>, tracker: &CompletionTracker) -> Vec<WorkerReport> {
    let mut reports = Vec::with_capacity(workers.len());
    while let Some(result) = workers.join_next().await {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => tracing::error!(error = %err, "Worker task ended abnormally"),
        }
    }
    tracker.wait().await;
    reports
}

async fn drain_service(
    service: &dyn ListeningService,
    deadline: Instant,
    escalation: Cancelled,
) -> DrainOutcome {
    let drain = service.drain(deadline);
    tokio::pin!(drain);

    tokio::select! {
        biased;
        outcome = &mut drain => outcome,
        _ = escalation.fired() => {
            tracing::warn!(in_flight = service.in_flight(), "Forcing listening service closed");
            service.force_close();
            drain.await
        }
    }
}
