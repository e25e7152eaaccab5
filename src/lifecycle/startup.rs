//! Startup orchestration.
//!
//! # Responsibilities
//! - Arm the termination trigger before anything else runs
//! - Launch the configured workers
//! - Attach the listening service (bound when the coordinator starts)
//!
//! # Design Decisions
//! - Fail fast: a trigger that cannot be armed aborts startup
//! - Workers start only after the trigger is armed, so no signal is missed
//! - The service listens last (traffic only when ready)

use std::sync::Arc;

use axum::Router;
use thiserror::Error;

use crate::config::AppConfig;
use crate::lifecycle::cancel::CancellationSignal;
use crate::lifecycle::coordinator::{CoordinatorError, ShutdownCoordinator, ShutdownPhase, ShutdownReport};
use crate::lifecycle::tracker::CompletionTracker;
use crate::lifecycle::signals::{TerminationSender, TerminationTrigger, TriggerError};
use crate::service::HttpService;
use crate::worker::{WorkUnit, Worker};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot guarantee graceful shutdown: {0}")]
    Trigger(#[from] TriggerError),
}

/// A fully wired process: trigger, coordinator, workers and optional service.
pub struct Application {
    coordinator: ShutdownCoordinator,
    trigger: TerminationTrigger,
    service: Option<Arc<HttpService>>,
}

impl Application {
    /// Arm OS signal handlers, then launch everything described by `config`.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(config: &AppConfig, unit: Arc<dyn WorkUnit>, router: Router) -> Result<Self, StartupError> {
        let shutdown = CancellationSignal::new();
        let escalation = CancellationSignal::new();
        let trigger = TerminationTrigger::arm(
            shutdown.clone(),
            escalation.clone(),
            config.shutdown.on_repeat_signal,
        )?;

        Ok(Self::assemble(config, unit, router, shutdown, escalation, trigger))
    }

    /// Like [`start`](Self::start), with termination requests delivered through the returned sender.
    pub fn start_manual(config: &AppConfig, unit: Arc<dyn WorkUnit>, router: Router) -> (Self, TerminationSender) {
        let shutdown = CancellationSignal::new();
        let escalation = CancellationSignal::new();
        let (trigger, sender) = TerminationTrigger::manual(
            shutdown.clone(),
            escalation.clone(),
            config.shutdown.on_repeat_signal,
        );

        (Self::assemble(config, unit, router, shutdown, escalation, trigger), sender)
    }

    fn assemble(
        config: &AppConfig,
        unit: Arc<dyn WorkUnit>,
        router: Router,
        shutdown: CancellationSignal,
        escalation: CancellationSignal,
        trigger: TerminationTrigger,
    ) -> Self {
        let mut coordinator = ShutdownCoordinator::new(shutdown, escalation, config.shutdown.clone());

        for index in 0..config.workers.count {
            let worker = Worker::from_shared(format!("worker-{index}"), Arc::clone(&unit))
                .with_idle(config.workers.idle_between_units());
            coordinator.spawn_worker(worker);
        }

        let service = if config.service.enabled {
            let service = Arc::new(HttpService::new(config.service.clone(), router));
            coordinator.set_service(service.clone());
            Some(service)
        } else {
            None
        };

        tracing::info!(
            workers = config.workers.count,
            service = config.service.enabled,
            grace_period_ms = config.shutdown.grace_period_ms,
            "Application assembled"
        );

        Self {
            coordinator,
            trigger,
            service,
        }
    }

    /// The HTTP service, when enabled.
    pub fn service(&self) -> Option<&Arc<HttpService>> {
        self.service.as_ref()
    }

    pub fn tracker(&self) -> &CompletionTracker {
        self.coordinator.tracker()
    }

    pub fn phase(&self) -> tokio::sync::watch::Receiver<ShutdownPhase> {
        self.coordinator.phase()
    }

    /// Run until shutdown completes.
    pub async fn run(self) -> Result<ShutdownReport, CoordinatorError> {
        let Self {
            coordinator,
            trigger,
            service: _,
        } = self;

        let report = coordinator.run().await;
        if let Some(reason) = trigger.first_reason() {
            tracing::debug!(signal = %reason, "Shutdown was requested by signal");
        }
        report
    }
}
