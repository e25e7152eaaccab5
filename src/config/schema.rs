//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the process.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listening service settings (bind address, limits).
    pub service: ServiceConfig,

    /// Repeating worker settings.
    pub workers: WorkerConfig,

    /// Shutdown policy.
    pub shutdown: ShutdownConfig,

    /// Collaborators used by the bundled binary.
    pub demo: DemoConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listening service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Run the HTTP service at all.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8333").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Per-request timeout in seconds. 0 disables the timeout layer.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8333".to_string(),
            max_connections: 10_000,
            request_timeout_secs: 0,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of workers to launch.
    pub count: usize,

    /// Pause between two units in milliseconds. Cancellation interrupts it.
    pub idle_between_units_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 1,
            idle_between_units_ms: 0,
        }
    }
}

impl WorkerConfig {
    pub fn idle_between_units(&self) -> Duration {
        Duration::from_millis(self.idle_between_units_ms)
    }
}

/// What a termination request does once shutdown is already underway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepeatSignalPolicy {
    /// Force-close the listening service immediately.
    #[default]
    Force,
    /// Log and keep draining.
    Ignore,
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time the listening service gets to drain, counted from the start of draining.
    pub grace_period_ms: u64,

    /// Behaviour on a second SIGINT/SIGTERM.
    pub on_repeat_signal: RepeatSignalPolicy,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 10_000,
            on_repeat_signal: RepeatSignalPolicy::Force,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Stand-in collaborators run by the binary: a sleeping job and a slow route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Duration of one job in milliseconds.
    pub unit_duration_ms: u64,

    /// Random extra duration added to each job, up to this many milliseconds.
    pub unit_jitter_ms: u64,

    /// How long `GET /test` takes to answer, in milliseconds.
    pub request_duration_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            unit_duration_ms: 2_000,
            unit_jitter_ms: 0,
            request_duration_ms: 5_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Human readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "graceful_shutdown=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.service.enabled);
        assert_eq!(config.workers.count, 1);
        assert_eq!(config.shutdown.grace_period(), Duration::from_secs(10));
        assert_eq!(config.shutdown.on_repeat_signal, RepeatSignalPolicy::Force);
        assert_eq!(config.demo.unit_duration_ms, 2_000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [shutdown]
            grace_period_ms = 250
            on_repeat_signal = "ignore"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.shutdown.grace_period_ms, 250);
        assert_eq!(config.shutdown.on_repeat_signal, RepeatSignalPolicy::Ignore);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.service.bind_address, "0.0.0.0:8333");
    }
}
