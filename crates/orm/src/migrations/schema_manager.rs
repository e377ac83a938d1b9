//! SchemaManager - the handle migration units use to change the schema
//!
//! Wraps the runner's connection together with its dialect. Existence checks
//! go through the dialect's metadata queries so units can be re-run safely.

use super::schema_builder::{IndexBuilder, SchemaBuilder, TableBuilder};
use crate::backends::{DatabaseConnection, DatabaseRow, DatabaseValue, SqlDialect};
use crate::error::{OrmError, OrmResult};

const ADD_COLUMN_SAVEPOINT: &str = "tidemark_add_column";

/// Schema operations available to a migration unit
pub struct SchemaManager<'c> {
    conn: &'c mut dyn DatabaseConnection,
    dialect: SqlDialect,
}

impl<'c> SchemaManager<'c> {
    pub fn new(conn: &'c mut dyn DatabaseConnection) -> Self {
        let dialect = conn.dialect();
        Self { conn, dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// A fresh builder for this dialect
    pub fn builder(&self) -> SchemaBuilder {
        SchemaBuilder::new(self.dialect)
    }

    /// Execute a single statement without parameters
    pub async fn execute(&mut self, sql: &str) -> OrmResult<u64> {
        self.conn.execute(sql, &[]).await
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>> {
        self.conn.fetch_all(sql, params).await
    }

    /// Execute every statement of a builder in order
    pub async fn run(&mut self, builder: SchemaBuilder) -> OrmResult<()> {
        tracing::debug!(statements = builder.statements().len(), "running schema builder");
        for statement in builder.into_statements() {
            self.conn.execute(&statement, &[]).await?;
        }
        Ok(())
    }

    /// Create a table described by `callback`
    pub async fn create_table<F>(&mut self, table_name: &str, callback: F) -> OrmResult<()>
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table = TableBuilder::new(self.dialect, table_name);
        callback(&mut table);
        self.execute(&table.to_sql()).await.map(|_| ())
    }

    /// Create an index described by `callback`
    pub async fn create_index<F>(&mut self, table_name: &str, columns: &[&str], callback: F) -> OrmResult<()>
    where
        F: FnOnce(&mut IndexBuilder),
    {
        let mut index = IndexBuilder::new(table_name, columns);
        callback(&mut index);
        self.execute(&index.to_sql()).await.map(|_| ())
    }

    pub async fn drop_table_if_exists(&mut self, table_name: &str) -> OrmResult<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", table_name))
            .await
            .map(|_| ())
    }

    /// Check whether a table exists
    pub async fn has_table(&mut self, table_name: &str) -> OrmResult<bool> {
        let sql = self.dialect.table_exists_sql();
        self.count(&sql, &[table_name.into()]).await
    }

    /// Check whether a column exists on a table
    pub async fn has_column(&mut self, table_name: &str, column_name: &str) -> OrmResult<bool> {
        let sql = self.dialect.column_exists_sql();
        self.count(&sql, &[table_name.into(), column_name.into()])
            .await
    }

    /// Check whether an index exists
    pub async fn has_index(&mut self, index_name: &str) -> OrmResult<bool> {
        let sql = self.dialect.index_exists_sql();
        self.count(&sql, &[index_name.into()]).await
    }

    /// Add a column unless it is already present
    ///
    /// Returns `true` when the column was added. Metadata is consulted first;
    /// an `AlreadyExists` failure from the `ALTER` itself is tolerated as well.
    /// Inside a transaction the `ALTER` runs under a savepoint, so the tolerated
    /// failure leaves the transaction usable on PostgreSQL.
    pub async fn add_column(&mut self, table_name: &str, column_name: &str, definition: &str) -> OrmResult<bool> {
        if self.has_column(table_name, column_name).await? {
            tracing::debug!(table = table_name, column = column_name, "column already present");
            return Ok(false);
        }

        let guarded = self.conn.in_transaction();
        if guarded {
            self.execute(&format!("SAVEPOINT {}", ADD_COLUMN_SAVEPOINT)).await?;
        }

        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table_name, column_name, definition);
        match self.execute(&sql).await {
            Ok(_) => {
                if guarded {
                    self.execute(&format!("RELEASE SAVEPOINT {}", ADD_COLUMN_SAVEPOINT)).await?;
                }
                Ok(true)
            }
            Err(err) if err.is_already_exists() => {
                tracing::warn!(table = table_name, column = column_name, error = %err, "ignoring already-exists error");
                if guarded {
                    self.execute(&format!("ROLLBACK TO SAVEPOINT {}", ADD_COLUMN_SAVEPOINT)).await?;
                    self.execute(&format!("RELEASE SAVEPOINT {}", ADD_COLUMN_SAVEPOINT)).await?;
                }
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Drop a column, if the dialect can express it
    pub async fn drop_column(&mut self, table_name: &str, column_name: &str) -> OrmResult<()> {
        if !self.dialect.supports_drop_column() {
            return Err(OrmError::UnsupportedOperation {
                dialect: self.dialect.to_string(),
                operation: format!("DROP COLUMN {}.{}", table_name, column_name),
            });
        }
        self.execute(&format!("ALTER TABLE {} DROP COLUMN {}", table_name, column_name))
            .await
            .map(|_| ())
    }

    async fn count(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<bool> {
        let row = self
            .conn
            .fetch_optional(sql, params)
            .await?
            .ok_or_else(|| OrmError::Decode("existence query returned no rows".to_string()))?;
        let count = row
            .get_by_index(0)?
            .as_i64()
            .ok_or_else(|| OrmError::Decode("existence query did not return a count".to_string()))?;
        Ok(count > 0)
    }
}
