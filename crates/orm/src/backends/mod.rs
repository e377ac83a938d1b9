//! Database Backend Abstractions
//!
//! The dialect helper, the connection trait migration units run against, and
//! the sqlx-backed implementation for PostgreSQL and SQLite.

pub mod core;
pub mod sqlx_any;

// Re-export core traits and types
pub use core::*;
pub use sqlx_any::{DatabasePool, SqlxConnection};
