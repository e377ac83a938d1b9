//! Error types for the database layer
//!
//! Driver errors are classified once, at the adapter boundary, so callers can
//! match on [`DbErrorKind`] instead of inspecting driver-specific message text.

use thiserror::Error;

/// Result type alias for database operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Structured classification of a failed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The table, column, index or other object being created already exists
    AlreadyExists,
    /// Any other database-reported failure
    Other,
}

/// Error types for database and schema operations
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    /// A statement was rejected by the database
    #[error("Database error: {message}")]
    Database { kind: DbErrorKind, message: String },

    /// Connection pool or transport error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction control (begin/commit/rollback) failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A result row could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Dialect tag or URL scheme not recognized
    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    /// The dialect cannot express the requested schema change
    #[error("Unsupported operation on {dialect}: {operation}")]
    UnsupportedOperation { dialect: String, operation: String },

    /// The change cannot be reversed
    #[error("Irreversible: {0}")]
    Irreversible(String),
}

impl OrmError {
    /// Build an unclassified database error
    pub fn database(message: impl Into<String>) -> Self {
        OrmError::Database {
            kind: DbErrorKind::Other,
            message: message.into(),
        }
    }

    /// Build an error of the already-exists class
    pub fn already_exists(message: impl Into<String>) -> Self {
        OrmError::Database {
            kind: DbErrorKind::AlreadyExists,
            message: message.into(),
        }
    }

    /// Classification of this error, `None` for non-database errors
    pub fn kind(&self) -> Option<DbErrorKind> {
        match self {
            OrmError::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True if this error only reports that the target object already exists
    pub fn is_already_exists(&self) -> bool {
        self.kind() == Some(DbErrorKind::AlreadyExists)
    }
}
