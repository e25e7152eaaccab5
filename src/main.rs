//! graceful-shutdown
//!
//! Runs repeating workers and an HTTP service until SIGINT/SIGTERM, then shuts
//! down in order.
//!
//! ```text
//!   SIGINT/SIGTERM ──▶ trigger ──▶ cancellation signal
//!                                     │
//!            ┌────────────────────────┼─────────────────────────┐
//!            ▼                        ▼                         ▼
//!      worker-0..N              http service               coordinator
//!   finish current unit       stop accepting        Running → SignalReceived
//!        and exit           drain within grace       → Draining → Stopped
//!            │                        │                         │
//!            └──── tracker.wait() ────┴──── clean / forced ─────┘
//! ```
//!
//! Exit codes: 0 clean, 1 forced, 2 startup failure.

mod demo;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use graceful_shutdown::config::{load_config, validate_config, AppConfig};
use graceful_shutdown::lifecycle::Application;
use graceful_shutdown::observability::{init_logging, init_metrics};
use graceful_shutdown::ShutdownOutcome;

const EXIT_FORCED: u8 = 1;
const EXIT_STARTUP: u8 = 2;

#[derive(Parser)]
#[command(name = "graceful-shutdown")]
#[command(about = "Run workers and an HTTP service, and shut them down gracefully", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Duration of one job in milliseconds
    #[arg(long)]
    unit_ms: Option<u64>,

    /// HTTP bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Run workers only
    #[arg(long)]
    no_service: bool,

    /// Drain grace period in seconds
    #[arg(long)]
    grace_secs: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.workers.count = workers;
        }
        if let Some(unit_ms) = self.unit_ms {
            config.demo.unit_duration_ms = unit_ms;
        }
        if let Some(bind) = &self.bind {
            config.service.bind_address = bind.clone();
        }
        if self.no_service {
            config.service.enabled = false;
        }
        if let Some(grace_secs) = self.grace_secs {
            config.shutdown.grace_period_ms = grace_secs.saturating_mul(1000);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::from(EXIT_STARTUP);
            }
        },
        None => AppConfig::default(),
    };
    cli.apply(&mut config);

    if let Err(errors) = validate_config(&config) {
        for error in errors {
            eprintln!("Invalid configuration: {error}");
        }
        return ExitCode::from(EXIT_STARTUP);
    }

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {e}");
    }

    tracing::info!("graceful-shutdown v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = match Application::start(&config, demo::job(&config.demo), demo::router(&config.demo)) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    match app.run().await {
        Ok(report) => match report.outcome {
            ShutdownOutcome::Clean => {
                tracing::info!("Exiting");
                ExitCode::SUCCESS
            }
            ShutdownOutcome::Forced => {
                tracing::warn!("Exiting after forced shutdown");
                ExitCode::from(EXIT_FORCED)
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}
