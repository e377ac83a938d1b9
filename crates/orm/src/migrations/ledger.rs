//! Version Ledger - persistent record of applied migration versions
//!
//! The ledger table is bootstrapped with fixed SQL that every supported
//! dialect accepts, so it never depends on the dialect helper.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::definitions::{LedgerEntry, MigrationError, DEFAULT_LEDGER_TABLE};
use crate::backends::{DatabaseConnection, DatabaseRow, DatabaseValue};
use crate::error::{OrmError, OrmResult};
use tidemark_core::is_plain_identifier;

/// Timestamp layouts PostgreSQL and SQLite produce for `CAST(applied_at AS TEXT)`
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Handle on the ledger table
#[derive(Debug, Clone)]
pub struct VersionLedger {
    table: String,
}

impl Default for VersionLedger {
    fn default() -> Self {
        Self {
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

impl VersionLedger {
    /// Use `table` as the ledger table; it must be a plain identifier
    pub fn new(table: impl Into<String>) -> Result<Self, MigrationError> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(MigrationError::InvalidLedgerTable(table));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL that creates the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version BIGINT PRIMARY KEY,\n    \
                name VARCHAR(255) NOT NULL,\n    \
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table
        )
    }

    /// Whether the ledger table exists
    pub async fn exists(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<bool> {
        let sql = conn.dialect().table_exists_sql();
        let row = conn
            .fetch_optional(&sql, &[self.table.as_str().into()])
            .await?;
        Ok(row
            .and_then(|r| r.get_by_index(0).ok().and_then(DatabaseValue::as_i64))
            .unwrap_or(0)
            > 0)
    }

    /// Create the ledger table unless it is already present
    ///
    /// Returns `true` if the table was created. Nothing is written when it exists.
    pub async fn ensure_table(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<bool> {
        if self.exists(conn).await? {
            return Ok(false);
        }
        tracing::info!(table = %self.table, "creating version ledger table");
        conn.execute(&self.create_table_sql(), &[]).await?;
        Ok(true)
    }

    /// All ledger entries ascending by version; a missing table reads as empty
    pub async fn entries(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<Vec<LedgerEntry>> {
        if !self.exists(conn).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT version, name, CAST(applied_at AS TEXT) AS applied_at FROM {} ORDER BY version ASC",
            self.table
        );
        conn.fetch_all(&sql, &[])
            .await?
            .iter()
            .map(entry_from_row)
            .collect()
    }

    /// Record `version` as applied
    pub async fn record(&self, conn: &mut dyn DatabaseConnection, version: i64, name: &str) -> OrmResult<()> {
        let dialect = conn.dialect();
        let sql = format!(
            "INSERT INTO {} (version, name) VALUES ({}, {})",
            self.table,
            dialect.parameter_placeholder(0),
            dialect.parameter_placeholder(1)
        );
        conn.execute(&sql, &[version.into(), name.into()]).await?;
        Ok(())
    }

    /// Remove the entry for `version`
    pub async fn remove(&self, conn: &mut dyn DatabaseConnection, version: i64) -> OrmResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE version = {}",
            self.table,
            conn.dialect().parameter_placeholder(0)
        );
        let removed = conn.execute(&sql, &[version.into()]).await?;
        if removed == 0 {
            tracing::warn!(version, table = %self.table, "no ledger entry to remove");
        }
        Ok(())
    }
}

fn entry_from_row(row: &DatabaseRow) -> OrmResult<LedgerEntry> {
    let version = row.get_i64("version")?;
    let name = row.get_string("name")?;
    let applied_at = parse_timestamp(&row.get_string("applied_at")?)?;

    Ok(LedgerEntry {
        version,
        name,
        applied_at,
    })
}

fn parse_timestamp(value: &str) -> OrmResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| OrmError::Decode(format!("unrecognized timestamp '{}'", value)))
}
