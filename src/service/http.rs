//! HTTP listening service.
//!
//! # Responsibilities
//! - Wrap an Axum Router with tracing and timeout middleware
//! - Serve HTTP/1.1 and HTTP/2 connections accepted by the bounded listener
//! - Track one task per connection so drain can wait for, or abort, them
//! - Count requests in flight so a cut drain reports the work it lost

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::config::ServiceConfig;
use crate::lifecycle::cancel::{CancellationSignal, Cancelled};
use crate::service::connection::{ConnectionGuard, ConnectionRegistry};
use crate::service::listener::{ConnectionPermit, Listener};
use crate::service::{DrainOutcome, ListeningService, ServiceError};

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// An Axum router served with stop / drain / force-close support.
pub struct HttpService {
    config: ServiceConfig,
    router: Router,
    connections: ConnectionRegistry,
    tasks: Arc<Mutex<JoinSet<()>>>,
    accept: Mutex<AcceptState>,
    stop: CancellationSignal,
    draining: CancellationSignal,
    force: CancellationSignal,
    /// Requests in flight when `force_close` ran.
    cut_by_force: AtomicU64,
}

#[derive(Default)]
struct AcceptState {
    local_addr: Option<SocketAddr>,
    task: Option<JoinHandle<()>>,
}

impl HttpService {
    /// Create a service for `router`. Nothing is bound until [`listen`](ListeningService::listen).
    pub fn new(config: ServiceConfig, router: Router) -> Self {
        let router = Self::build_router(&config, router);
        Self {
            config,
            router,
            connections: ConnectionRegistry::new(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            accept: Mutex::new(AcceptState::default()),
            stop: CancellationSignal::new(),
            draining: CancellationSignal::new(),
            force: CancellationSignal::new(),
            cut_by_force: AtomicU64::new(0),
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, router: Router) -> Router {
        let router = if config.request_timeout_secs > 0 {
            router.layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        } else {
            router
        };
        router.layer(TraceLayer::new_for_http())
    }

    /// Address the service is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.accept_state().local_addr
    }

    fn accept_state(&self) -> MutexGuard<'_, AcceptState> {
        self.accept.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connection_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        lock_tasks(&self.tasks)
    }
}

#[async_trait]
impl ListeningService for HttpService {
    async fn listen(&self) -> Result<SocketAddr, ServiceError> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let listener = Listener::bind(&self.config).await?;
        let addr = listener.local_addr();

        let mut state = self.accept_state();
        if let Some(existing) = state.local_addr {
            // A concurrent listen won; this listener is dropped.
            return Ok(existing);
        }

        state.local_addr = Some(addr);
        state.task = Some(tokio::spawn(accept_loop(
            listener,
            self.router.clone(),
            Arc::clone(&self.tasks),
            self.connections.clone(),
            self.stop.observe(),
            self.draining.observe(),
        )));

        tracing::info!(address = %addr, "HTTP service listening");
        Ok(addr)
    }

    async fn stop_accepting(&self) {
        self.stop.fire();

        let task = self.accept_state().task.take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "Accept loop ended abnormally");
            }
        }
    }

    async fn drain(&self, deadline: Instant) -> DrainOutcome {
        self.stop_accepting().await;

        let mut tasks = std::mem::take(&mut *self.connection_tasks());
        tracing::info!(
            connections = self.connections.open_connections(),
            requests = self.connections.active_requests(),
            "Draining connections"
        );

        self.draining.fire();
        let force = self.force.observe();

        let drained = tokio::select! {
            biased;
            _ = force.fired() => false,
            _ = join_all(&mut tasks) => true,
            _ = tokio::time::sleep_until(deadline) => false,
        };

        // Tasks aborted by an earlier force_close also end the join.
        if drained && !self.force.is_fired() {
            tracing::info!("All connections drained");
            return DrainOutcome::Completed;
        }

        let abandoned = self
            .connections
            .active_requests()
            .max(self.cut_by_force.load(Ordering::SeqCst));
        tracing::debug!(peers = ?self.connections.busy_peers(), "Cutting requests in flight");
        tasks.shutdown().await;
        tracing::warn!(abandoned, "Drain cut short, remaining connections closed");
        DrainOutcome::Forced { abandoned }
    }

    fn force_close(&self) {
        self.cut_by_force
            .fetch_max(self.connections.active_requests(), Ordering::SeqCst);
        self.stop.fire();
        self.force.fire();
        self.connection_tasks().abort_all();
    }

    fn in_flight(&self) -> u64 {
        self.connections.active_requests()
    }
}

fn lock_tasks(tasks: &Mutex<JoinSet<()>>) -> MutexGuard<'_, JoinSet<()>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(err) = result {
            if err.is_panic() {
                tracing::error!(error = %err, "Connection task panicked");
            }
        }
    }
}

async fn accept_loop(
    listener: Listener,
    router: Router,
    tasks: Arc<Mutex<JoinSet<()>>>,
    connections: ConnectionRegistry,
    stop: Cancelled,
    draining: Cancelled,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = stop.fired() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(err) => {
                tracing::warn!(error = %err, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        let guard = connections.open(peer_addr);
        let span = tracing::debug_span!("connection", connection_id = %guard.id(), peer_addr = %peer_addr);
        let connection = serve_connection(stream, router.clone(), draining.clone(), guard, permit);

        let mut set = lock_tasks(&tasks);
        while set.try_join_next().is_some() {}
        set.spawn(connection.instrument(span));
    }

    tracing::info!(address = %listener.local_addr(), "Stopped accepting connections");
}

async fn serve_connection(
    stream: TcpStream,
    router: Router,
    draining: Cancelled,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
) {
    let guard = Arc::new(guard);
    let service = hyper::service::service_fn({
        let guard = Arc::clone(&guard);
        move |request: Request<Incoming>| {
            // Counted until the response head is ready.
            let request_guard = guard.begin_request();
            let response = router.clone().oneshot(request);
            async move {
                let response = response.await;
                drop(request_guard);
                response
            }
        }
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = draining.fired() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(err) = result {
        tracing::debug!(connection_id = %guard.id(), error = %err, "Connection error");
    }
    drop(guard);
}
