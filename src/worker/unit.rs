//! The opaque unit of work a worker repeats.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Why a single unit did not succeed. Never stops the worker loop.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("unit failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("unit panicked: {0}")]
    Panicked(String),
}

impl UnitError {
    pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        UnitError::Failed(err.into())
    }
}

/// One atomic piece of application work.
///
/// A worker never interrupts `execute`; cancellation only prevents the next call.
#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    async fn execute(&self) -> Result<(), UnitError>;
}

/// Unit backed by an async closure. See [`unit_fn`].
pub struct FnUnit<F>(F);

/// Wrap an async closure as a [`WorkUnit`].
pub fn unit_fn<F, Fut>(f: F) -> FnUnit<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    FnUnit(f)
}

#[async_trait]
impl<F, Fut> WorkUnit for FnUnit<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    async fn execute(&self) -> Result<(), UnitError> {
        (self.0)().await
    }
}

/// Unit backed by a blocking closure, run on Tokio's blocking pool.
pub struct BlockingUnit<F> {
    f: Arc<F>,
}

impl<F> BlockingUnit<F>
where
    F: Fn() -> Result<(), UnitError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> WorkUnit for BlockingUnit<F>
where
    F: Fn() -> Result<(), UnitError> + Send + Sync + 'static,
{
    async fn execute(&self) -> Result<(), UnitError> {
        let f = Arc::clone(&self.f);
        match tokio::task::spawn_blocking(move || f()).await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                Err(UnitError::Panicked(panic_message(join_error.into_panic())))
            }
            Err(join_error) => Err(UnitError::failed(join_error)),
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_unit_reports_panics() {
        let unit = BlockingUnit::new(|| -> Result<(), UnitError> { panic!("boom") });
        match unit.execute().await {
            Err(UnitError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fn_unit_passes_errors_through() {
        let unit = unit_fn(|| async { Err(UnitError::failed("disk full")) });
        let err = unit.execute().await.unwrap_err();
        assert_eq!(err.to_string(), "unit failed: disk full");
    }
}
