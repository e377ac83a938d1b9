//! sqlx Backend Implementation
//!
//! Implements [`DatabaseConnection`] on top of sqlx's `Any` driver so the same
//! migration code runs against PostgreSQL and SQLite. Driver errors are
//! classified here and nowhere else.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{Any, AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::error::UnexpectedNullError;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{AnyPool, Column, Executor, Row, TypeInfo, ValueRef};

use super::core::*;
use crate::error::{OrmError, OrmResult};

/// SQLSTATE codes PostgreSQL reports for objects that already exist
const PG_ALREADY_EXISTS_CODES: &[&str] = &[
    "42701", // duplicate_column
    "42P07", // duplicate_table
    "42710", // duplicate_object
];

/// Connection pool bound to a single dialect
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: AnyPool,
    dialect: SqlDialect,
}

impl DatabasePool {
    /// Connect to `url`
    ///
    /// The dialect is detected from the URL scheme unless given explicitly.
    pub async fn connect(url: &str, dialect: Option<SqlDialect>, max_connections: u32) -> OrmResult<Self> {
        let dialect = match dialect {
            Some(dialect) => dialect,
            None => SqlDialect::from_url(url)?,
        };

        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30));

        // An in-memory SQLite database lives exactly as long as its connection.
        if dialect == SqlDialect::SQLite && url.contains(":memory:") {
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(url)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to connect to {} database: {}", dialect, e)))?;

        tracing::debug!(%dialect, max_connections, "database pool ready");

        Ok(Self { pool, dialect })
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Acquire a dedicated connection from the pool
    pub async fn acquire(&self) -> OrmResult<SqlxConnection> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to acquire connection: {}", e)))?;

        Ok(SqlxConnection::new(conn, self.dialect))
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// A pooled connection; returned to the pool on drop
pub struct SqlxConnection {
    conn: Option<PoolConnection<Any>>,
    dialect: SqlDialect,
    in_transaction: bool,
}

impl SqlxConnection {
    fn new(conn: PoolConnection<Any>, dialect: SqlDialect) -> Self {
        Self {
            conn: Some(conn),
            dialect,
            in_transaction: false,
        }
    }

    fn raw(&mut self) -> OrmResult<&mut PoolConnection<Any>> {
        self.conn
            .as_mut()
            .ok_or_else(|| OrmError::Connection("connection already released".to_string()))
    }

    async fn control(&mut self, statement: &'static str) -> OrmResult<()> {
        let conn = self.raw()?;
        (&mut **conn)
            .execute(statement)
            .await
            .map_err(|e| OrmError::Transaction(format!("{} failed: {}", statement, e)))?;
        Ok(())
    }
}

impl Drop for SqlxConnection {
    fn drop(&mut self) {
        if self.in_transaction {
            // Never hand a connection with an open transaction back to the pool.
            if let Some(conn) = self.conn.take() {
                tracing::warn!("connection dropped inside a transaction; detaching from pool");
                drop(conn.detach());
            }
        }
    }
}

#[async_trait]
impl DatabaseConnection for SqlxConnection {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        tracing::debug!(sql, params = params.len(), "execute");
        let conn = self.raw()?;
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut **conn)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>> {
        tracing::debug!(sql, params = params.len(), "fetch");
        let conn = self.raw()?;
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut **conn)
            .await
            .map_err(classify)?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin_transaction(&mut self) -> OrmResult<()> {
        if self.in_transaction {
            return Err(OrmError::Transaction("transaction already open".to_string()));
        }
        self.control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        if !self.in_transaction {
            return Err(OrmError::Transaction("no open transaction to commit".to_string()));
        }
        self.control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        if !self.in_transaction {
            return Err(OrmError::Transaction("no open transaction to roll back".to_string()));
        }
        let result = self.control("ROLLBACK").await;
        self.in_transaction = false;
        result
    }
}

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Bind parameter values to a query
fn bind_params<'q>(mut query: AnyQuery<'q>, params: &[DatabaseValue]) -> AnyQuery<'q> {
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(None::<String>),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::Float64(f) => query.bind(*f),
            DatabaseValue::String(s) => query.bind(s.clone()),
        };
    }
    query
}

/// Convert a driver row into a [`DatabaseRow`]
fn decode_row(row: &AnyRow) -> OrmResult<DatabaseRow> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(columns.len());

    for index in 0..columns.len() {
        if is_null_at(row, index)? {
            values.push(DatabaseValue::Null);
            continue;
        }

        let value = if let Ok(v) = row.try_get::<i64, _>(index) {
            DatabaseValue::Int64(v)
        } else if let Ok(v) = row.try_get::<String, _>(index) {
            DatabaseValue::String(v)
        } else if let Ok(v) = row.try_get::<f64, _>(index) {
            DatabaseValue::Float64(v)
        } else if let Ok(v) = row.try_get::<bool, _>(index) {
            DatabaseValue::Bool(v)
        } else {
            return Err(OrmError::Decode(format!(
                "column '{}' has a type the migration layer cannot read",
                columns[index]
            )));
        };
        values.push(value);
    }

    Ok(DatabaseRow::new(columns, values))
}

/// Whether the value at `index` is SQL NULL
///
/// The `Any` value wrapper does not always report NULL through `is_null`, so the
/// value's type info and a decode attempt are consulted as well.
fn is_null_at(row: &AnyRow, index: usize) -> OrmResult<bool> {
    let raw = row
        .try_get_raw(index)
        .map_err(|e| OrmError::Decode(format!("column {}: {}", index, e)))?;
    if raw.is_null() || raw.type_info().is_null() {
        return Ok(true);
    }

    Ok(match row.try_get::<Option<i64>, _>(index) {
        Ok(value) => value.is_none(),
        Err(sqlx::Error::ColumnDecode { source, .. }) => source.is::<UnexpectedNullError>(),
        Err(_) => false,
    })
}

/// Classify a driver error into an [`OrmError`]
pub(crate) fn classify(error: sqlx::Error) -> OrmError {
    match error {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            let by_code = db
                .code()
                .map(|code| PG_ALREADY_EXISTS_CODES.iter().any(|known| *known == code))
                .unwrap_or(false);

            if by_code || sqlite_reports_existing(&message) {
                OrmError::already_exists(message)
            } else {
                OrmError::database(message)
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            OrmError::Connection(error.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            OrmError::Decode(error.to_string())
        }
        other => OrmError::database(other.to_string()),
    }
}

/// SQLite reports every failure as `SQLITE_ERROR`; the object kind is only in the message
fn sqlite_reports_existing(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.starts_with("duplicate column name")
        || ((message.starts_with("table ") || message.starts_with("index ") || message.starts_with("trigger ") || message.starts_with("view "))
            && message.ends_with("already exists"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_connection() -> SqlxConnection {
        let pool = DatabasePool::connect("sqlite::memory:", None, 1).await.unwrap();
        pool.acquire().await.unwrap()
    }

    #[test]
    fn test_sqlite_message_classification() {
        assert!(sqlite_reports_existing("duplicate column name: is_active"));
        assert!(sqlite_reports_existing("table items already exists"));
        assert!(sqlite_reports_existing("index idx_items_name already exists"));
        assert!(!sqlite_reports_existing("no such table: items"));
        assert!(!sqlite_reports_existing("UNIQUE constraint failed: items.name"));
    }

    #[tokio::test]
    async fn test_duplicate_column_is_classified() {
        let mut conn = memory_connection().await;
        conn.execute("CREATE TABLE t (a INTEGER)", &[]).await.unwrap();
        conn.execute("ALTER TABLE t ADD COLUMN b INTEGER", &[]).await.unwrap();

        let err = conn.execute("ALTER TABLE t ADD COLUMN b INTEGER", &[]).await.unwrap_err();
        assert!(err.is_already_exists(), "unexpected error: {:?}", err);

        let err = conn.execute("CREATE TABLE t (a INTEGER)", &[]).await.unwrap_err();
        assert!(err.is_already_exists());

        let err = conn.execute("SELECT * FROM missing", &[]).await.unwrap_err();
        assert!(!err.is_already_exists());
    }

    #[tokio::test]
    async fn test_row_decoding() {
        let mut conn = memory_connection().await;
        conn.execute("CREATE TABLE t (id INTEGER, label TEXT, note TEXT)", &[]).await.unwrap();
        conn.execute(
            "INSERT INTO t (id, label, note) VALUES (?, ?, ?)",
            &[7i64.into(), "seven".into(), DatabaseValue::Null],
        )
        .await
        .unwrap();

        let row = conn
            .fetch_optional("SELECT id, label, note FROM t", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_i64("id").unwrap(), 7);
        assert_eq!(row.get_string("label").unwrap(), "seven");
        assert!(row.get_by_name("note").unwrap().is_null());
    }

    #[tokio::test]
    async fn test_nullable_integer_column_decodes_as_null() {
        let mut conn = memory_connection().await;
        conn.execute("CREATE TABLE items (id INTEGER, is_active INTEGER)", &[]).await.unwrap();
        conn.execute("INSERT INTO items (id, is_active) VALUES (1, NULL), (2, 1)", &[])
            .await
            .unwrap();

        let rows = conn
            .fetch_all("SELECT id, is_active FROM items ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get_by_name("is_active").unwrap().is_null());
        assert_eq!(rows[1].get_i64("is_active").unwrap(), 1);

        let row = conn.fetch_optional("SELECT NULL AS x", &[]).await.unwrap().unwrap();
        assert!(row.get_by_index(0).unwrap().is_null());
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let mut conn = memory_connection().await;
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();

        conn.begin_transaction().await.unwrap();
        assert!(conn.in_transaction());
        conn.execute("INSERT INTO t (id) VALUES (1)", &[]).await.unwrap();
        conn.rollback().await.unwrap();
        assert!(!conn.in_transaction());

        let row = conn.fetch_optional("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap().unwrap();
        assert_eq!(row.get_i64("n").unwrap(), 0);

        assert!(conn.commit().await.is_err());
    }
}
