//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the migration unit capability set, ledger records, runner states and
//! the reports handed back to callers.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

use super::schema_manager::SchemaManager;
use crate::error::{OrmError, OrmResult};
use tidemark_core::ConfigError;

/// Default name of the version ledger table
pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";

/// A single versioned schema or data change
///
/// Units are registered explicitly with a [`MigrationRegistry`](super::MigrationRegistry)
/// and never touch transactions or the ledger; the runner owns both.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Unique, ordered version number
    fn version(&self) -> i64;

    /// Human-readable name, recorded in the ledger
    fn name(&self) -> &str;

    /// Whether `down` can undo `up`
    fn reversible(&self) -> bool {
        true
    }

    /// Apply the change
    async fn up(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()>;

    /// Reverse the change
    async fn down(&self, _schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        Err(OrmError::Irreversible(format!(
            "migration {} ({}) cannot be rolled back",
            self.version(),
            self.name()
        )))
    }

    /// Re-check the post-condition of `up`
    ///
    /// `None` means the unit defines no verification.
    async fn verify(&self, _schema: &mut SchemaManager<'_>) -> OrmResult<Option<bool>> {
        Ok(None)
    }
}

impl fmt::Debug for dyn MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("version", &self.version())
            .field("name", &self.name())
            .field("reversible", &self.reversible())
            .finish()
    }
}

/// A row of the version ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration (run `up`)
    Up,
    /// Roll back the migration (run `down`)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => f.write_str("up"),
            MigrationDirection::Down => f.write_str("down"),
        }
    }
}

/// Runner state, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "version", rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    Planning,
    Applying(i64),
    Recording(i64),
    Failed(i64),
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::Idle => f.write_str("idle"),
            RunnerState::Planning => f.write_str("planning"),
            RunnerState::Applying(v) => write!(f, "applying({})", v),
            RunnerState::Recording(v) => write!(f, "recording({})", v),
            RunnerState::Failed(v) => write!(f, "failed({})", v),
        }
    }
}

/// Non-fatal conditions found while comparing the ledger with the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationWarning {
    /// The ledger lists a version the registry does not know
    DivergedHistory { version: i64, name: String },
    /// The ledger name for a known version differs from the registered name
    NameMismatch {
        version: i64,
        recorded: String,
        registered: String,
    },
}

impl fmt::Display for MigrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationWarning::DivergedHistory { version, name } => write!(
                f,
                "applied version {} ({}) is not registered; database history has diverged",
                version, name
            ),
            MigrationWarning::NameMismatch {
                version,
                recorded,
                registered,
            } => write!(
                f,
                "version {} was recorded as '{}' but is registered as '{}'",
                version, recorded, registered
            ),
        }
    }
}

/// Outcome of a `migrate_up` / `migrate_down` invocation
#[derive(Debug, Serialize)]
pub struct MigrationReport {
    pub direction: MigrationDirection,
    /// Versions completed in this invocation, in execution order
    pub applied_versions: Vec<i64>,
    /// Version that halted the batch
    pub failed_version: Option<i64>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<MigrationError>,
    pub warnings: Vec<MigrationWarning>,
    /// The batch succeeded and changed at least one version
    pub cleanup_recommended: bool,
    pub final_state: RunnerState,
    pub execution_time_ms: u128,
}

impl MigrationReport {
    pub(crate) fn empty(direction: MigrationDirection) -> Self {
        Self {
            direction,
            applied_versions: Vec::new(),
            failed_version: None,
            error: None,
            warnings: Vec::new(),
            cleanup_recommended: false,
            final_state: RunnerState::Idle,
            execution_time_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, surfacing the halting error if any
    pub fn into_result(mut self) -> Result<Self, MigrationError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

fn serialize_error<S: Serializer>(error: &Option<MigrationError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Snapshot of registry versus ledger
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Highest applied version that the registry knows
    pub current_version: Option<i64>,
    /// Ledger contents, ascending by version
    pub applied: Vec<LedgerEntry>,
    /// Known versions not yet applied, ascending
    pub pending_versions: Vec<i64>,
    pub total_known_versions: usize,
    pub warnings: Vec<MigrationWarning>,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.pending_versions.is_empty()
    }

    pub fn has_diverged(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, MigrationWarning::DivergedHistory { .. }))
    }
}

/// Migration engine errors
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion { version: i64, first: String, second: String },

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Migration {version} ({name}) failed during {direction}: {source}")]
    Apply {
        version: i64,
        name: String,
        direction: MigrationDirection,
        #[source]
        source: OrmError,
    },

    #[error("Migration {version} ({name}) is irreversible: {reason}")]
    Irreversible { version: i64, name: String, reason: String },

    #[error("Migration {version} is pending but version {latest_applied} is already applied")]
    OutOfOrder { version: i64, latest_applied: i64 },

    #[error("Invalid ledger table name '{0}'")]
    InvalidLedgerTable(String),

    #[error("Version ledger error: {0}")]
    Ledger(#[source] OrmError),

    #[error("Database error: {0}")]
    Database(#[source] OrmError),

    #[error("Migration lock error: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<OrmError> for MigrationError {
    fn from(err: OrmError) -> Self {
        match err {
            OrmError::UnsupportedDialect(tag) => MigrationError::UnsupportedDialect(tag),
            other => MigrationError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_into_result() {
        let mut report = MigrationReport::empty(MigrationDirection::Up);
        report.applied_versions.push(1);
        assert!(report.is_success());
        assert_eq!(report.into_result().unwrap().applied_versions, vec![1]);

        let mut report = MigrationReport::empty(MigrationDirection::Up);
        report.failed_version = Some(3);
        report.error = Some(MigrationError::Lock("busy".to_string()));
        assert!(!report.is_success());
        assert!(matches!(report.into_result(), Err(MigrationError::Lock(_))));
    }

    #[test]
    fn test_report_serializes_error_as_text() {
        let mut report = MigrationReport::empty(MigrationDirection::Down);
        report.error = Some(MigrationError::Irreversible {
            version: 1,
            name: "baseline".to_string(),
            reason: "baseline".to_string(),
        });
        report.final_state = RunnerState::Failed(1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["direction"], "down");
        assert_eq!(json["final_state"]["state"], "failed");
        assert_eq!(json["final_state"]["version"], 1);
        assert!(json["error"].as_str().unwrap().contains("irreversible"));
    }

    #[test]
    fn test_warning_display() {
        let warning = MigrationWarning::DivergedHistory {
            version: 99,
            name: "ghost".to_string(),
        };
        assert!(warning.to_string().contains("99"));
        assert_eq!(serde_json::to_value(&warning).unwrap()["kind"], "diverged_history");
    }

    #[test]
    fn test_orm_error_conversion() {
        let err: MigrationError = OrmError::UnsupportedDialect("mysql".to_string()).into();
        assert!(matches!(err, MigrationError::UnsupportedDialect(tag) if tag == "mysql"));

        let err: MigrationError = OrmError::database("boom").into();
        assert!(matches!(err, MigrationError::Database(_)));
    }
}
