//! Core Database Backend Traits
//!
//! This module defines the dialect helper and the connection abstraction the
//! migration engine runs against. Migration units only ever see these types, so
//! they stay independent of the concrete driver.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::{OrmError, OrmResult};

/// SQL dialect enumeration for generating database-specific SQL
///
/// All methods are pure string generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Detect the dialect from a database URL scheme
    pub fn from_url(url: &str) -> OrmResult<Self> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Ok(SqlDialect::PostgreSQL)
        } else if url.starts_with("sqlite:") {
            Ok(SqlDialect::SQLite)
        } else {
            let scheme = url.split(':').next().unwrap_or(url);
            Err(OrmError::UnsupportedDialect(scheme.to_string()))
        }
    }

    /// Short lowercase name, as accepted by [`FromStr`]
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "postgres",
            SqlDialect::SQLite => "sqlite",
        }
    }

    /// Get the parameter placeholder for the zero-based parameter `index`
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Auto-incrementing primary-key column definition
    pub fn primary_key(&self, column: &str) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("{} SERIAL PRIMARY KEY", column),
            SqlDialect::SQLite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", column),
        }
    }

    /// Column type for a timestamp defaulting to the current time
    pub fn timestamp(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
            SqlDialect::SQLite => "DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP",
        }
    }

    /// Boolean column type
    ///
    /// SQLite has no native boolean; flags are stored as `0`/`1` integers.
    pub fn boolean(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "BOOLEAN",
            SqlDialect::SQLite => "INTEGER",
        }
    }

    /// Boolean literal matching [`SqlDialect::boolean`]
    pub fn boolean_value(&self, value: bool) -> &'static str {
        match (self, value) {
            (SqlDialect::PostgreSQL, true) => "TRUE",
            (SqlDialect::PostgreSQL, false) => "FALSE",
            (SqlDialect::SQLite, true) => "1",
            (SqlDialect::SQLite, false) => "0",
        }
    }

    /// Whether `ALTER TABLE ... DROP COLUMN` is available
    pub fn supports_drop_column(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL => true,
            SqlDialect::SQLite => false,
        }
    }

    /// Whether DDL statements can run inside a transaction and be rolled back
    pub fn supports_transactional_ddl(&self) -> bool {
        match self {
            SqlDialect::PostgreSQL | SqlDialect::SQLite => true,
        }
    }

    /// Query counting tables named by the single parameter
    pub fn table_exists_sql(&self) -> String {
        match self {
            SqlDialect::PostgreSQL => format!(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name::text = {}",
                self.parameter_placeholder(0)
            ),
            SqlDialect::SQLite => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?".to_string()
            }
        }
    }

    /// Query counting columns; parameters are the table name then the column name
    pub fn column_exists_sql(&self) -> String {
        match self {
            SqlDialect::PostgreSQL => format!(
                "SELECT COUNT(*) FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name::text = {} AND column_name::text = {}",
                self.parameter_placeholder(0),
                self.parameter_placeholder(1)
            ),
            SqlDialect::SQLite => "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?".to_string(),
        }
    }

    /// Query counting indexes named by the single parameter
    pub fn index_exists_sql(&self) -> String {
        match self {
            SqlDialect::PostgreSQL => format!(
                "SELECT COUNT(*) FROM pg_indexes \
                 WHERE schemaname = current_schema() AND indexname::text = {}",
                self.parameter_placeholder(0)
            ),
            SqlDialect::SQLite => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?".to_string()
            }
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlDialect {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(SqlDialect::PostgreSQL),
            "sqlite" | "sqlite3" => Ok(SqlDialect::SQLite),
            _ => Err(OrmError::UnsupportedDialect(s.to_string())),
        }
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Integer view of the value; booleans stored as integers convert too
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Boolean view of the value; SQLite `0`/`1` integers convert too
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(b) => Some(*b),
            DatabaseValue::Int64(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int64(i64::from(value))
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// A decoded result row
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> OrmResult<&DatabaseValue> {
        self.values
            .get(index)
            .ok_or_else(|| OrmError::Decode(format!("column index {} out of range", index)))
    }

    /// Get a column value by name
    pub fn get_by_name(&self, name: &str) -> OrmResult<&DatabaseValue> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| OrmError::Decode(format!("column '{}' not found", name)))?;
        self.get_by_index(index)
    }

    pub fn get_i64(&self, name: &str) -> OrmResult<i64> {
        self.get_by_name(name)?
            .as_i64()
            .ok_or_else(|| OrmError::Decode(format!("column '{}' is not an integer", name)))
    }

    pub fn get_string(&self, name: &str) -> OrmResult<String> {
        self.get_by_name(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OrmError::Decode(format!("column '{}' is not text", name)))
    }

    /// Get column count
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Abstract database connection trait
///
/// A connection executes one statement per call. Transaction control is explicit
/// so the migration runner can scope each unit in its own transaction.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Dialect of the database behind this connection
    fn dialect(&self) -> SqlDialect;

    /// True while a transaction begun through this connection is open
    fn in_transaction(&self) -> bool;

    /// Execute a statement and return affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return the result rows
    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>>;

    /// Execute a query and return the first result row
    async fn fetch_optional(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<DatabaseRow>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Begin a transaction
    async fn begin_transaction(&mut self) -> OrmResult<()>;

    /// Commit the open transaction
    async fn commit(&mut self) -> OrmResult<()>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> OrmResult<()>;
}
