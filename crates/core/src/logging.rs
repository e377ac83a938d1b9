//! Structured logging setup shared by the migration binary and embedding services.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_config::LoggingConfig;

/// Default filter applied when `RUST_LOG` is not set
fn default_filter(level: &str) -> String {
    format!("tidemark={level},tidemark_orm={level},tidemark_core={level},sqlx=warn")
}

/// Initialize structured logging for the process
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to stderr so
/// that reports printed on stdout stay machine-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(&config.level.to_lowercase())))?;

    let registry = tracing_subscriber::registry().with(filter);

    match config.format.to_lowercase().as_str() {
        "json" => registry
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        "pretty" => registry
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?,
        _ => registry
            .with(Layer::new().with_writer(io::stderr).compact())
            .try_init()?,
    }

    tracing::debug!(
        target: "tidemark::logging",
        level = %config.level,
        format = %config.format,
        "structured logging initialized"
    );

    Ok(())
}
