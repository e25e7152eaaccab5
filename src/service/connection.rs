//! Live connection and request bookkeeping for the listening service.
//!
//! # Responsibilities
//! - Register every accepted connection under a service-local id
//! - Count requests being served on each connection
//! - Answer how much work a drain would cut if it ended now
//!
//! # Design Decisions
//! - A connection with no request in flight is idle: closing it loses nothing
//! - Guards release their entries on drop, so aborted connection tasks clean up too

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Service-local identity of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
struct OpenConnection {
    peer_addr: SocketAddr,
    requests: u64,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    open: DashMap<ConnectionId, OpenConnection>,
}

/// Connections accepted by one service and the requests running on them.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted connection. The entry lives as long as the guard.
    pub fn open(&self, peer_addr: SocketAddr) -> ConnectionGuard {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.inner.open.insert(id, OpenConnection { peer_addr, requests: 0 });
        metrics::gauge!("service_connections_active").increment(1.0);

        ConnectionGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Connections accepted and not yet closed.
    pub fn open_connections(&self) -> u64 {
        self.inner.open.len() as u64
    }

    /// Requests started and not yet answered, across all connections.
    pub fn active_requests(&self) -> u64 {
        self.inner.open.iter().map(|entry| entry.requests).sum()
    }

    /// Peers with a request in flight.
    pub fn busy_peers(&self) -> Vec<SocketAddr> {
        self.inner
            .open
            .iter()
            .filter(|entry| entry.requests > 0)
            .map(|entry| entry.peer_addr)
            .collect()
    }

    fn adjust_requests(&self, id: ConnectionId, delta: i64) {
        if let Some(mut entry) = self.inner.open.get_mut(&id) {
            entry.requests = entry.requests.saturating_add_signed(delta);
        }
    }

    fn close(&self, id: ConnectionId) {
        if let Some((_, connection)) = self.inner.open.remove(&id) {
            metrics::gauge!("service_connections_active").decrement(1.0);
            tracing::trace!(
                connection_id = %id,
                peer_addr = %connection.peer_addr,
                requests_cut = connection.requests,
                "Connection closed"
            );
        }
    }
}

/// Keeps a connection registered until dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: ConnectionRegistry,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Mark a request as started on this connection.
    pub fn begin_request(&self) -> RequestGuard {
        self.registry.adjust_requests(self.id, 1);
        metrics::gauge!("service_requests_in_flight").increment(1.0);
        RequestGuard {
            registry: self.registry.clone(),
            id: self.id,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.close(self.id);
    }
}

/// Counts one request as in flight until dropped.
#[derive(Debug)]
pub struct RequestGuard {
    registry: ConnectionRegistry,
    id: ConnectionId,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.registry.adjust_requests(self.id, -1);
        metrics::gauge!("service_requests_in_flight").decrement(1.0);
    }
}
