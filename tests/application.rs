//! End-to-end shutdown through the assembled application.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use graceful_shutdown::config::RepeatSignalPolicy;
use graceful_shutdown::lifecycle::{Application, CoordinatorError, TerminationReason};
use graceful_shutdown::service::DrainOutcome;
use graceful_shutdown::{ShutdownOutcome, ShutdownPhase};
use tokio::sync::Notify;
use tokio::time::Instant;

mod common;

#[tokio::test]
async fn signal_drains_request_and_workers_cleanly() {
    common::init_tracing();
    let runs = Arc::new(AtomicU64::new(0));
    let started = Arc::new(Notify::new());
    let config = common::local_config(2, 5_000);

    let (app, sender) = Application::start_manual(
        &config,
        common::counting_unit(Duration::from_millis(100), Arc::clone(&runs)),
        common::slow_router(Duration::from_millis(300), Arc::clone(&started)),
    );
    let service = Arc::clone(app.service().unwrap());
    let mut phase = app.phase();
    let run = tokio::spawn(app.run());

    let addr = common::eventually(Duration::from_secs(5), || service.local_addr()).await;
    let request = tokio::spawn(common::client().get(format!("http://{addr}/slow")).send());
    started.notified().await;

    assert!(sender.send(TerminationReason::Terminate));
    phase.wait_for(|p| *p >= ShutdownPhase::SignalReceived).await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(report.outcome, ShutdownOutcome::Clean);
    assert_eq!(report.service, Some(DrainOutcome::Completed));
    assert_eq!(report.workers.len(), 2);
    let completed: u64 = report.workers.iter().map(|w| w.units_completed).sum();
    assert_eq!(completed, runs.load(Ordering::SeqCst));
    assert_eq!(*phase.borrow(), ShutdownPhase::Stopped);

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.text().await.unwrap(), "done");
}

#[tokio::test]
async fn repeated_signal_forces_service_closed() {
    common::init_tracing();
    let runs = Arc::new(AtomicU64::new(0));
    let started = Arc::new(Notify::new());
    let config = common::local_config(1, 60_000);

    let (app, sender) = Application::start_manual(
        &config,
        common::counting_unit(Duration::from_millis(50), Arc::clone(&runs)),
        common::slow_router(Duration::from_secs(60), Arc::clone(&started)),
    );
    let service = Arc::clone(app.service().unwrap());
    let mut phase = app.phase();
    let run = tokio::spawn(app.run());

    let addr = common::eventually(Duration::from_secs(5), || service.local_addr()).await;
    let request = tokio::spawn(common::client().get(format!("http://{addr}/slow")).send());
    started.notified().await;

    sender.send(TerminationReason::Interrupt);
    phase.wait_for(|p| *p == ShutdownPhase::Draining).await.unwrap();
    let begin = Instant::now();
    sender.send(TerminationReason::Interrupt);

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(report.outcome, ShutdownOutcome::Forced);
    assert_eq!(report.service, Some(DrainOutcome::Forced { abandoned: 1 }));
    assert!(begin.elapsed() < Duration::from_secs(5));
    assert!(request.await.unwrap().is_err());
}

#[tokio::test]
async fn repeated_signal_is_ignored_when_configured() {
    common::init_tracing();
    let started = Arc::new(Notify::new());
    let mut config = common::local_config(0, 300);
    config.shutdown.on_repeat_signal = RepeatSignalPolicy::Ignore;

    let (app, sender) = Application::start_manual(
        &config,
        common::counting_unit(Duration::from_millis(50), Arc::new(AtomicU64::new(0))),
        common::slow_router(Duration::from_secs(60), Arc::clone(&started)),
    );
    let service = Arc::clone(app.service().unwrap());
    let run = tokio::spawn(app.run());

    let addr = common::eventually(Duration::from_secs(5), || service.local_addr()).await;
    let _request = tokio::spawn(common::client().get(format!("http://{addr}/slow")).send());
    started.notified().await;

    let begin = Instant::now();
    sender.send(TerminationReason::Terminate);
    sender.send(TerminationReason::Terminate);

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // Only the grace period ends the drain.
    assert_eq!(report.outcome, ShutdownOutcome::Forced);
    assert!(begin.elapsed() >= Duration::from_millis(300));
    assert!(report.workers.is_empty());
}

#[tokio::test]
async fn workers_only_without_service() {
    common::init_tracing();
    let runs = Arc::new(AtomicU64::new(0));
    let mut config = common::local_config(3, 1_000);
    config.service.enabled = false;

    let (app, sender) = Application::start_manual(
        &config,
        common::counting_unit(Duration::from_millis(20), Arc::clone(&runs)),
        axum::Router::new(),
    );
    assert!(app.service().is_none());
    let tracker = app.tracker().clone();
    assert_eq!(tracker.outstanding(), 3);

    let run = tokio::spawn(app.run());
    common::eventually(Duration::from_secs(5), || (runs.load(Ordering::SeqCst) >= 3).then_some(())).await;
    sender.send(TerminationReason::Interrupt);

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.outcome, ShutdownOutcome::Clean);
    assert_eq!(report.service, None);
    assert_eq!(tracker.outstanding(), 0);
}

#[tokio::test]
async fn bind_failure_stops_workers_and_errors() {
    common::init_tracing();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = common::local_config(2, 1_000);
    config.service.bind_address = taken.local_addr().unwrap().to_string();

    let (app, _sender) = Application::start_manual(
        &config,
        common::counting_unit(Duration::from_millis(20), Arc::new(AtomicU64::new(0))),
        axum::Router::new(),
    );
    let tracker = app.tracker().clone();
    let phase = app.phase();

    let result = tokio::time::timeout(Duration::from_secs(5), app.run()).await.unwrap();
    assert!(matches!(result, Err(CoordinatorError::Service(_))));
    assert_eq!(tracker.outstanding(), 0);
    assert_eq!(*phase.borrow(), ShutdownPhase::Stopped);
}
