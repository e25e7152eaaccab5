//! Graceful shutdown coordination for long-running processes.
//!
//! A termination request (SIGINT/SIGTERM) fires one cancellation signal.
//! Workers finish the unit they are on and exit, the listening service stops
//! accepting and drains within a grace period, and the coordinator reports
//! whether the shutdown was clean or forced.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod service;
pub mod worker;

pub use config::AppConfig;
pub use lifecycle::{
    Application, CancellationSignal, Cancelled, CompletionTracker, ShutdownCoordinator,
    ShutdownOutcome, ShutdownPhase, ShutdownReport, TerminationTrigger,
};
pub use service::{DrainOutcome, HttpService, ListeningService};
pub use worker::{WorkUnit, Worker};
