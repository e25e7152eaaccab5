//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use graceful_shutdown::config::AppConfig;
use graceful_shutdown::worker::{unit_fn, WorkUnit};
use tokio::sync::Notify;

/// Install a test-friendly subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("graceful_shutdown=debug")
        .with_test_writer()
        .try_init();
}

/// Config bound to an ephemeral local port.
pub fn local_config(workers: usize, grace_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.service.bind_address = "127.0.0.1:0".into();
    config.workers.count = workers;
    config.shutdown.grace_period_ms = grace_ms;
    config
}

/// Router whose `GET /slow` takes `delay` and notifies `started` on entry.
pub fn slow_router(delay: Duration, started: Arc<Notify>) -> Router {
    Router::new()
        .route(
            "/slow",
            get(move || {
                let started = Arc::clone(&started);
                async move {
                    started.notify_one();
                    tokio::time::sleep(delay).await;
                    "done"
                }
            }),
        )
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        )
}

/// Async unit that sleeps for `duration` and counts completed runs.
pub fn counting_unit(duration: Duration, runs: Arc<AtomicU64>) -> Arc<dyn WorkUnit> {
    Arc::new(unit_fn(move || {
        let runs = Arc::clone(&runs);
        async move {
            tokio::time::sleep(duration).await;
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

/// Client that never reuses connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Poll `check` until it returns `Some`, or panic after `timeout`.
pub async fn eventually<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> T {
    let started = tokio::time::Instant::now();
    loop {
        if let Some(value) = check() {
            return value;
        }
        assert!(started.elapsed() < timeout, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
