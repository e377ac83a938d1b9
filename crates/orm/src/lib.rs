//! # tidemark-orm: Database Layer for tidemark
//!
//! Dialect-aware schema helpers, a sqlx-backed connection layer and the
//! versioned migration engine built on them.
//!
//! Units are registered explicitly with a [`MigrationRegistry`], applied by a
//! [`MigrationRunner`] in ascending version order and recorded in the
//! [`VersionLedger`].

pub mod backends;
pub mod error;
pub mod migrations;

// Re-export core traits and types
pub use backends::{DatabaseConnection, DatabasePool, DatabaseRow, DatabaseValue, SqlDialect, SqlxConnection};
pub use error::*;
pub use migrations::*;
