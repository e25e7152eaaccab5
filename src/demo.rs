//! Stand-in collaborators for the binary: a sleeping job and a slow route.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{routing::get, Json, Router};
use graceful_shutdown::config::DemoConfig;
use graceful_shutdown::worker::{BlockingUnit, UnitError, WorkUnit};

/// A blocking job that sleeps for the configured duration, plus jitter.
pub fn job(config: &DemoConfig) -> Arc<dyn WorkUnit> {
    let base = config.unit_duration_ms;
    let jitter = config.unit_jitter_ms;

    Arc::new(BlockingUnit::new(move || -> Result<(), UnitError> {
        let duration = job_duration(base, fastrand::u64(0..=jitter));
        tracing::info!(at = ?SystemTime::now(), duration_ms = duration.as_millis() as u64, "Start job");
        std::thread::sleep(duration);
        tracing::info!("Done job");
        Ok(())
    }))
}

fn job_duration(base_ms: u64, jitter_ms: u64) -> Duration {
    Duration::from_millis(base_ms.saturating_add(jitter_ms))
}

/// `GET /test` answers `test` after the configured delay; `GET /health` answers at once.
pub fn router(config: &DemoConfig) -> Router {
    let delay = Duration::from_millis(config.request_duration_ms);

    Router::new()
        .route(
            "/test",
            get(move || async move {
                tracing::info!("Start request");
                tokio::time::sleep(delay).await;
                tracing::info!("Done request");
                "test"
            }),
        )
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_duration_saturates() {
        assert_eq!(job_duration(2_000, 250), Duration::from_millis(2_250));
        assert_eq!(job_duration(u64::MAX, u64::MAX), Duration::from_millis(u64::MAX));
    }
}
