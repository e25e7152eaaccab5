//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Arm signal handlers → Launch workers → Attach listening service
//!
//! Shutdown (coordinator.rs):
//!     Signal received → Stop accepting → Drain (workers + connections) → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → cancel.rs fires → workers and service observe it
//!     Repeated SIGTERM/SIGINT → escalation, service force-closed
//!
//! Tracking (tracker.rs):
//!     register before launch → complete on exit → coordinator waits for zero
//! ```
//!
//! # Design Decisions
//! - Signal handlers are registered before any worker starts
//! - Ordered shutdown: stop accept, drain, close
//! - Drain has a deadline: connections are cut once it passes

pub mod cancel;
pub mod coordinator;
pub mod signals;
pub mod startup;
pub mod tracker;

pub use cancel::{CancellationSignal, Cancelled};
pub use coordinator::{
    CoordinatorError, ShutdownCoordinator, ShutdownOutcome, ShutdownPhase, ShutdownReport,
};
pub use signals::{TerminationReason, TerminationSender, TerminationTrigger, TriggerError};
pub use startup::{Application, StartupError};
pub use tracker::{CompletionTracker, TrackerError, WorkerHandle, WorkerId};
