//! Shared helpers for migration integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tidemark_orm::{
    DatabaseConnection, DatabasePool, DatabaseRow, DatabaseValue, MigrationUnit, OrmError, OrmResult,
    SchemaManager, SqlDialect, SqlxConnection,
};

/// A single-connection in-memory SQLite database
pub async fn memory_db() -> (DatabasePool, SqlxConnection) {
    let pool = DatabasePool::connect("sqlite::memory:", None, 1)
        .await
        .expect("in-memory sqlite");
    let conn = pool.acquire().await.expect("connection");
    (pool, conn)
}

pub async fn count(conn: &mut dyn DatabaseConnection, sql: &str) -> i64 {
    let row = conn.fetch_optional(sql, &[]).await.unwrap().unwrap();
    row.get_by_index(0).unwrap().as_i64().unwrap()
}

pub async fn ledger_versions(conn: &mut dyn DatabaseConnection) -> Vec<i64> {
    conn.fetch_all("SELECT version FROM schema_migrations ORDER BY version", &[])
        .await
        .unwrap()
        .iter()
        .map(|row| row.get_i64("version").unwrap())
        .collect()
}

/// Creates `t<version>` and logs how many lower versions were already recorded
pub struct RecordingUnit {
    pub version: i64,
    pub name: String,
    pub log: Arc<Mutex<Vec<(i64, i64)>>>,
}

impl RecordingUnit {
    pub fn new(version: i64, log: &Arc<Mutex<Vec<(i64, i64)>>>) -> Self {
        Self {
            version,
            name: format!("create_t{}", version),
            log: Arc::clone(log),
        }
    }
}

#[async_trait]
impl MigrationUnit for RecordingUnit {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        let rows = schema
            .fetch_all(
                "SELECT COUNT(*) AS n FROM schema_migrations WHERE version < ?",
                &[self.version.into()],
            )
            .await?;
        let recorded_below = rows[0].get_i64("n")?;
        self.log.lock().unwrap().push((self.version, recorded_below));

        schema
            .execute(&format!("CREATE TABLE t{} (id INTEGER)", self.version))
            .await
            .map(|_| ())
    }

    async fn down(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        schema.drop_table_if_exists(&format!("t{}", self.version)).await
    }

    async fn verify(&self, schema: &mut SchemaManager<'_>) -> OrmResult<Option<bool>> {
        Ok(Some(schema.has_table(&format!("t{}", self.version)).await?))
    }
}

/// Creates a table, then fails
pub struct FailingUnit(pub i64);

#[async_trait]
impl MigrationUnit for FailingUnit {
    fn version(&self) -> i64 {
        self.0
    }

    fn name(&self) -> &str {
        "failing"
    }

    async fn up(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        schema.execute("CREATE TABLE partial_work (id INTEGER)").await?;
        schema.execute("INSERT INTO no_such_table VALUES (1)").await?;
        Ok(())
    }

    async fn down(&self, _schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        Err(OrmError::database("down should not run"))
    }
}

/// Applies cleanly but its check queries a table that does not exist
pub struct BrokenCheckUnit(pub i64);

#[async_trait]
impl MigrationUnit for BrokenCheckUnit {
    fn version(&self) -> i64 {
        self.0
    }

    fn name(&self) -> &str {
        "broken_check"
    }

    async fn up(&self, _schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        Ok(())
    }

    async fn verify(&self, schema: &mut SchemaManager<'_>) -> OrmResult<Option<bool>> {
        schema.fetch_all("SELECT * FROM gone", &[]).await?;
        Ok(Some(true))
    }
}

/// Delegating connection that counts statements which are not plain reads
pub struct CountingConnection<'a> {
    pub inner: &'a mut SqlxConnection,
    pub writes: Vec<String>,
}

impl<'a> CountingConnection<'a> {
    pub fn new(inner: &'a mut SqlxConnection) -> Self {
        Self {
            inner,
            writes: Vec::new(),
        }
    }
}

#[async_trait]
impl DatabaseConnection for CountingConnection<'_> {
    fn dialect(&self) -> SqlDialect {
        self.inner.dialect()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        self.writes.push(sql.to_string());
        self.inner.execute(sql, params).await
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>> {
        if !sql.trim_start().to_uppercase().starts_with("SELECT") {
            self.writes.push(sql.to_string());
        }
        self.inner.fetch_all(sql, params).await
    }

    async fn begin_transaction(&mut self) -> OrmResult<()> {
        self.writes.push("BEGIN".to_string());
        self.inner.begin_transaction().await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.writes.push("COMMIT".to_string());
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.inner.rollback().await
    }
}
