//! Repeating workers.
//!
//! # Data Flow
//! ```text
//! loop:
//!     cancellation fired? → exit, complete handle
//!     execute one unit (never interrupted)
//!         → Ok: count
//!         → Err / panic: log, count, keep looping
//!     optional idle pause (interrupted by cancellation)
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative and checked before every unit
//! - Shutdown latency is bounded by the remaining time of the in-flight unit
//! - Unit failures stay inside the worker and are never escalated

pub mod unit;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::Instrument;

use crate::lifecycle::cancel::Cancelled;
use crate::lifecycle::tracker::WorkerHandle;

pub use unit::{unit_fn, BlockingUnit, FnUnit, UnitError, WorkUnit};

/// A named loop around a [`WorkUnit`].
pub struct Worker {
    name: String,
    unit: Arc<dyn WorkUnit>,
    idle_between_units: Duration,
}

/// What a worker did before it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub name: String,
    pub units_completed: u64,
    pub units_failed: u64,
}

impl Worker {
    pub fn new(name: impl Into<String>, unit: impl WorkUnit) -> Self {
        Self::from_shared(name, Arc::new(unit))
    }

    /// Build a worker around a unit shared with other workers.
    pub fn from_shared(name: impl Into<String>, unit: Arc<dyn WorkUnit>) -> Self {
        Self {
            name: name.into(),
            unit,
            idle_between_units: Duration::ZERO,
        }
    }

    /// Pause between two units. Cancellation cuts the pause short.
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle_between_units = idle;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until `cancelled` fires, then complete `handle`.
    pub async fn run(self, cancelled: Cancelled, handle: WorkerHandle) -> WorkerReport {
        let span = tracing::info_span!("worker", worker = %self.name, worker_id = %handle.id());
        self.run_loop(cancelled, handle).instrument(span).await
    }

    async fn run_loop(self, cancelled: Cancelled, handle: WorkerHandle) -> WorkerReport {
        let mut report = WorkerReport {
            name: self.name.clone(),
            units_completed: 0,
            units_failed: 0,
        };

        tracing::debug!("Worker started");

        loop {
            if cancelled.is_fired() {
                break;
            }

            let result = AssertUnwindSafe(self.unit.execute()).catch_unwind().await;
            match result {
                Ok(Ok(())) => {
                    report.units_completed += 1;
                    metrics::counter!("worker_units_total", "result" => "ok").increment(1);
                }
                Ok(Err(err)) => {
                    report.units_failed += 1;
                    metrics::counter!("worker_units_total", "result" => "error").increment(1);
                    tracing::warn!(error = %err, "Work unit failed");
                }
                Err(payload) => {
                    report.units_failed += 1;
                    metrics::counter!("worker_units_total", "result" => "panic").increment(1);
                    tracing::warn!(panic = %unit::panic_message(payload), "Work unit panicked");
                }
            }

            if !self.idle_between_units.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_between_units) => {}
                    _ = cancelled.fired() => {}
                }
            }
        }

        tracing::info!(
            units_completed = report.units_completed,
            units_failed = report.units_failed,
            "Worker exiting"
        );

        if let Err(err) = handle.complete() {
            tracing::error!(error = %err, "Worker completion rejected");
        }
        report
    }
}
