//! Listening service subsystem.
//!
//! # Data Flow
//! ```text
//! Running:
//!     listener.rs (accept loop, connection limits)
//!     → connection.rs (open connections, requests in flight)
//!     → http.rs (hyper connection serving an axum Router)
//!
//! Shutdown:
//!     stop_accepting → listener closed, new connections refused
//!     drain(deadline) → live connections finish their request
//!         → all closed before deadline: Completed
//!         → deadline or force_close: remaining connections aborted, Forced
//! ```
//!
//! # Design Decisions
//! - Stop-then-drain order: draining while still accepting would never converge
//! - The deadline is an instant computed by the caller when draining starts
//! - Forced close drops connection tasks, which closes their sockets abruptly

pub mod connection;
pub mod http;
pub mod listener;

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionRegistry, RequestGuard};
pub use http::HttpService;
pub use listener::{Listener, ListenerError};

/// Result of draining a listening service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every accepted connection finished before the deadline.
    Completed,
    /// The deadline passed or a forced close was requested.
    Forced {
        /// Requests in flight when the connections were cut.
        abandoned: u64,
    },
}

impl DrainOutcome {
    pub fn is_forced(&self) -> bool {
        matches!(self, DrainOutcome::Forced { .. })
    }
}

/// Error type for service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A request-serving component the shutdown coordinator can drive.
#[async_trait]
pub trait ListeningService: Send + Sync {
    /// Start accepting. Calling it again while listening returns the bound address.
    async fn listen(&self) -> Result<SocketAddr, ServiceError>;

    /// Refuse new connections; in-flight requests keep running.
    /// Returns once the listening socket is closed.
    async fn stop_accepting(&self);

    /// Wait for accepted connections to finish, cutting them at `deadline`.
    ///
    /// Stops accepting first if that has not happened yet.
    async fn drain(&self, deadline: Instant) -> DrainOutcome;

    /// Abort every live connection now. A running `drain` returns `Forced`.
    fn force_close(&self);

    /// Requests being served right now.
    fn in_flight(&self) -> u64;
}
