//! Configuration for the ok-photos sync engine.
//!
//! Holds the per-call API limits, the remote field sets requested for each
//! entity kind, the local database location and the logging bootstrap.

pub mod config;
pub mod fields;
pub mod logging;

pub use config::{ApiConfig, AppConfig, ConfigError, DatabaseConfig, FetchLimits, LoggingConfig};
pub use fields::{FieldKind, FieldSets};
pub use logging::init_logging;
