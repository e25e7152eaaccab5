//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT) before any worker starts
//! - Translate signals to internal events
//! - Fire the cancellation signal on the first request
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are registered synchronously inside `arm`, so a signal delivered
//!   right after `arm` returns is never lost
//! - A repeated SIGTERM/SIGINT fires the escalation signal (forced shutdown)
//!   unless the policy says to ignore it
//! - Failing to register is fatal: the caller must not start without it

use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RepeatSignalPolicy;
use crate::lifecycle::cancel::CancellationSignal;

/// External reasons to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Interrupt => "SIGINT",
            TerminationReason::Terminate => "SIGTERM",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for trigger setup.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("failed to register {reason} handler: {source}")]
    Register {
        reason: TerminationReason,
        #[source]
        source: std::io::Error,
    },
}

/// In-process source of termination requests, for tests and embedders.
#[derive(Debug, Clone)]
pub struct TerminationSender {
    tx: mpsc::UnboundedSender<TerminationReason>,
}

impl TerminationSender {
    /// Deliver a request. Returns `false` if the trigger is gone.
    pub fn send(&self, reason: TerminationReason) -> bool {
        self.tx.send(reason).is_ok()
    }
}

/// Bridges termination requests into the cancellation signal.
///
/// Dropping the trigger stops observing; keep it alive for the whole process.
pub struct TerminationTrigger {
    first: Arc<OnceLock<TerminationReason>>,
    relay: JoinHandle<()>,
    listener: Option<JoinHandle<()>>,
}

impl TerminationTrigger {
    /// Register OS signal handlers and start relaying them.
    ///
    /// Must be called from inside a Tokio runtime. Does not block.
    pub fn arm(
        shutdown: CancellationSignal,
        escalation: CancellationSignal,
        policy: RepeatSignalPolicy,
    ) -> Result<Self, TriggerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = os::listen(tx)?;

        let mut trigger = Self::spawn(rx, shutdown, escalation, policy);
        trigger.listener = Some(listener);

        tracing::debug!(?policy, "Termination trigger armed");
        Ok(trigger)
    }

    /// Same relay as [`arm`](Self::arm), fed by the returned sender instead of the OS.
    pub fn manual(
        shutdown: CancellationSignal,
        escalation: CancellationSignal,
        policy: RepeatSignalPolicy,
    ) -> (Self, TerminationSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self::spawn(rx, shutdown, escalation, policy),
            TerminationSender { tx },
        )
    }

    /// The request that started shutdown, if one arrived.
    pub fn first_reason(&self) -> Option<TerminationReason> {
        self.first.get().copied()
    }

    fn spawn(
        rx: mpsc::UnboundedReceiver<TerminationReason>,
        shutdown: CancellationSignal,
        escalation: CancellationSignal,
        policy: RepeatSignalPolicy,
    ) -> Self {
        let first = Arc::new(OnceLock::new());
        let relay = tokio::spawn(relay(rx, shutdown, escalation, policy, Arc::clone(&first)));
        Self {
            first,
            relay,
            listener: None,
        }
    }
}

impl Drop for TerminationTrigger {
    fn drop(&mut self) {
        self.relay.abort();
        if let Some(listener) = &self.listener {
            listener.abort();
        }
    }
}

async fn relay(
    mut rx: mpsc::UnboundedReceiver<TerminationReason>,
    shutdown: CancellationSignal,
    escalation: CancellationSignal,
    policy: RepeatSignalPolicy,
    first: Arc<OnceLock<TerminationReason>>,
) {
    while let Some(reason) = rx.recv().await {
        metrics::counter!("termination_requests_total", "signal" => reason.as_str()).increment(1);

        if first.set(reason).is_ok() {
            tracing::info!(signal = %reason, "Termination requested, shutting down gracefully");
            shutdown.fire();
            continue;
        }

        match policy {
            RepeatSignalPolicy::Force => {
                if escalation.fire() {
                    tracing::warn!(signal = %reason, "Repeated termination request, forcing shutdown");
                }
            }
            RepeatSignalPolicy::Ignore => {
                tracing::info!(signal = %reason, "Shutdown already in progress, ignoring request");
            }
        }
    }
}

#[cfg(unix)]
mod os {
    use tokio::signal::unix::{signal, SignalKind};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::{TerminationReason, TriggerError};

    pub(super) fn listen(
        tx: mpsc::UnboundedSender<TerminationReason>,
    ) -> Result<JoinHandle<()>, TriggerError> {
        let mut interrupt = signal(SignalKind::interrupt()).map_err(|source| TriggerError::Register {
            reason: TerminationReason::Interrupt,
            source,
        })?;
        let mut terminate = signal(SignalKind::terminate()).map_err(|source| TriggerError::Register {
            reason: TerminationReason::Terminate,
            source,
        })?;

        Ok(tokio::spawn(async move {
            loop {
                let reason = tokio::select! {
                    Some(()) = interrupt.recv() => TerminationReason::Interrupt,
                    Some(()) = terminate.recv() => TerminationReason::Terminate,
                    else => break,
                };
                if tx.send(reason).is_err() {
                    break;
                }
            }
        }))
    }
}

#[cfg(not(unix))]
mod os {
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    use super::{TerminationReason, TriggerError};

    pub(super) fn listen(
        tx: mpsc::UnboundedSender<TerminationReason>,
    ) -> Result<JoinHandle<()>, TriggerError> {
        let mut ctrl_c = tokio::signal::windows::ctrl_c().map_err(|source| TriggerError::Register {
            reason: TerminationReason::Interrupt,
            source,
        })?;

        Ok(tokio::spawn(async move {
            while ctrl_c.recv().await.is_some() {
                if tx.send(TerminationReason::Interrupt).is_err() {
                    break;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn first_request_fires_shutdown() {
        let shutdown = CancellationSignal::new();
        let escalation = CancellationSignal::new();
        let (trigger, sender) =
            TerminationTrigger::manual(shutdown.clone(), escalation.clone(), RepeatSignalPolicy::Force);

        assert!(sender.send(TerminationReason::Terminate));
        tokio::time::timeout(Duration::from_secs(1), shutdown.observe().fired())
            .await
            .unwrap();

        assert_eq!(trigger.first_reason(), Some(TerminationReason::Terminate));
        assert!(!escalation.is_fired());
    }

    #[tokio::test]
    async fn repeated_request_escalates_under_force_policy() {
        let shutdown = CancellationSignal::new();
        let escalation = CancellationSignal::new();
        let (trigger, sender) =
            TerminationTrigger::manual(shutdown.clone(), escalation.clone(), RepeatSignalPolicy::Force);

        sender.send(TerminationReason::Interrupt);
        sender.send(TerminationReason::Terminate);
        tokio::time::timeout(Duration::from_secs(1), escalation.observe().fired())
            .await
            .unwrap();

        assert!(shutdown.is_fired());
        assert_eq!(trigger.first_reason(), Some(TerminationReason::Interrupt));
    }

    #[tokio::test]
    async fn repeated_request_ignored_under_ignore_policy() {
        let shutdown = CancellationSignal::new();
        let escalation = CancellationSignal::new();
        let (_trigger, sender) =
            TerminationTrigger::manual(shutdown.clone(), escalation.clone(), RepeatSignalPolicy::Ignore);

        for _ in 0..3 {
            sender.send(TerminationReason::Interrupt);
        }
        settle().await;

        assert!(shutdown.is_fired());
        assert!(!escalation.is_fired());
    }

    #[tokio::test]
    async fn dropping_trigger_stops_relaying() {
        let shutdown = CancellationSignal::new();
        let (trigger, sender) = TerminationTrigger::manual(
            shutdown.clone(),
            CancellationSignal::new(),
            RepeatSignalPolicy::Force,
        );
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), sender.tx.closed())
            .await
            .expect("relay should release its receiver");

        assert!(!sender.send(TerminationReason::Interrupt));
        assert!(!shutdown.is_fired());
    }

    // Tokio keeps the handler installed for the rest of the process.
    #[cfg(unix)]
    #[tokio::test]
    async fn armed_trigger_fires_on_sigterm() {
        use nix::sys::signal::{raise, Signal};

        let shutdown = CancellationSignal::new();
        let escalation = CancellationSignal::new();
        let trigger = TerminationTrigger::arm(shutdown.clone(), escalation.clone(), RepeatSignalPolicy::Force)
            .expect("signal registration");
        assert_eq!(trigger.first_reason(), None);

        raise(Signal::SIGTERM).expect("raise SIGTERM");
        tokio::time::timeout(Duration::from_secs(5), shutdown.observe().fired())
            .await
            .expect("SIGTERM should fire shutdown");
        assert_eq!(trigger.first_reason(), Some(TerminationReason::Terminate));

        raise(Signal::SIGTERM).expect("raise SIGTERM");
        tokio::time::timeout(Duration::from_secs(5), escalation.observe().fired())
            .await
            .expect("second SIGTERM should escalate");
    }

    #[test]
    fn reasons_render_as_signal_names() {
        assert_eq!(TerminationReason::Interrupt.to_string(), "SIGINT");
        assert_eq!(TerminationReason::Terminate.to_string(), "SIGTERM");
    }
}
