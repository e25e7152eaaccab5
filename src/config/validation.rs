//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (grace period > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::AppConfig;

/// Longest grace period accepted (one hour). The drain must stay bounded.
pub const MAX_GRACE_PERIOD_MS: u64 = 60 * 60 * 1000;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("shutdown.grace_period_ms must be greater than zero")]
    ZeroGracePeriod,

    #[error("shutdown.grace_period_ms must not exceed {max} (got {0})", max = MAX_GRACE_PERIOD_MS)]
    GracePeriodTooLong(u64),

    #[error("service.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("service.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),

    #[error("observability.log_level {0:?} is not a valid filter")]
    LogLevel(String),

    #[error("nothing to run: workers.count is 0 and the service is disabled")]
    NothingToRun,
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let grace = config.shutdown.grace_period_ms;
    if grace == 0 {
        errors.push(ValidationError::ZeroGracePeriod);
    } else if grace > MAX_GRACE_PERIOD_MS {
        errors.push(ValidationError::GracePeriodTooLong(grace));
    }

    if config.service.enabled {
        if config.service.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BindAddress(config.service.bind_address.clone()));
        }
        if config.service.max_connections == 0 {
            errors.push(ValidationError::ZeroMaxConnections);
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }
    if EnvFilter::try_new(&observability.log_level).is_err() {
        errors.push(ValidationError::LogLevel(observability.log_level.clone()));
    }

    if config.workers.count == 0 && !config.service.enabled {
        errors.push(ValidationError::NothingToRun);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
