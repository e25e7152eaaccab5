//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → CLI overrides applied by the binary, then validated again
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::AppConfig;
pub use schema::DemoConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::RepeatSignalPolicy;
pub use schema::ServiceConfig;
pub use schema::ShutdownConfig;
pub use schema::WorkerConfig;
pub use validation::{validate_config, ValidationError};
