//! # tidemark-core
//!
//! Environment-driven configuration and logging setup for the tidemark
//! migration engine.

pub mod app_config;
pub mod logging;

pub use app_config::{
    is_plain_identifier, AppConfig, AppConfigTrait, ConfigError, ConfigSource, DatabaseConfig,
    Environment, LoggingConfig, MigrationSettings,
};
pub use logging::init_logging;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
