//! Migration Runner - Executes migrations against the database
//!
//! Diffs the registry against the version ledger, applies pending units in
//! ascending order, each inside its own transaction, and records every
//! success in the ledger before moving on.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use super::definitions::{
    LedgerEntry, MigrationDirection, MigrationError, MigrationReport, MigrationStatus, MigrationUnit,
    MigrationWarning, RunnerState,
};
use super::ledger::VersionLedger;
use super::registry::MigrationRegistry;
use super::schema_manager::SchemaManager;
use crate::backends::DatabaseConnection;
use crate::error::OrmError;

/// Ledger contents compared against the registry
pub(crate) struct LedgerView {
    pub entries: Vec<LedgerEntry>,
    /// Applied versions that the registry knows
    pub applied_known: BTreeSet<i64>,
    pub warnings: Vec<MigrationWarning>,
}

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    units: Vec<Arc<dyn MigrationUnit>>,
    ledger: VersionLedger,
    allow_out_of_order: bool,
}

impl MigrationRunner {
    /// Create a runner over the registry's units
    ///
    /// Fails with `DuplicateVersion` before any database access.
    pub fn new(registry: &MigrationRegistry, ledger: VersionLedger) -> Result<Self, MigrationError> {
        Ok(Self {
            units: registry.load_all()?,
            ledger,
            allow_out_of_order: false,
        })
    }

    /// Apply known versions below the latest applied one instead of refusing
    pub fn allow_out_of_order(mut self, allow: bool) -> Self {
        self.allow_out_of_order = allow;
        self
    }

    /// Units ascending by version
    pub fn units(&self) -> &[Arc<dyn MigrationUnit>] {
        &self.units
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub(crate) fn unit(&self, version: i64) -> Option<&Arc<dyn MigrationUnit>> {
        self.units
            .binary_search_by_key(&version, |u| u.version())
            .ok()
            .map(|index| &self.units[index])
    }

    pub(crate) fn transition(&self, state: &mut RunnerState, next: RunnerState) {
        tracing::debug!(from = %state, to = %next, "runner state");
        *state = next;
    }

    /// Read the ledger and classify its entries
    pub(crate) async fn read_ledger(&self, conn: &mut dyn DatabaseConnection) -> Result<LedgerView, MigrationError> {
        let entries = self
            .ledger
            .entries(conn)
            .await
            .map_err(MigrationError::Ledger)?;

        let mut applied_known = BTreeSet::new();
        let mut warnings = Vec::new();

        for entry in &entries {
            match self.unit(entry.version) {
                Some(unit) => {
                    applied_known.insert(entry.version);
                    if unit.name() != entry.name {
                        warnings.push(MigrationWarning::NameMismatch {
                            version: entry.version,
                            recorded: entry.name.clone(),
                            registered: unit.name().to_string(),
                        });
                    }
                }
                None => warnings.push(MigrationWarning::DivergedHistory {
                    version: entry.version,
                    name: entry.name.clone(),
                }),
            }
        }

        for warning in &warnings {
            tracing::warn!(%warning, "migration history warning");
        }

        Ok(LedgerView {
            entries,
            applied_known,
            warnings,
        })
    }

    /// Pending versions up to `target`, checked for holes
    fn pending(&self, view: &LedgerView, target: Option<i64>) -> Result<Vec<Arc<dyn MigrationUnit>>, MigrationError> {
        let pending: Vec<Arc<dyn MigrationUnit>> = self
            .units
            .iter()
            .filter(|u| !view.applied_known.contains(&u.version()))
            .filter(|u| target.map_or(true, |t| u.version() <= t))
            .cloned()
            .collect();

        if let Some(&latest_applied) = view.applied_known.iter().next_back() {
            for unit in pending.iter().filter(|u| u.version() < latest_applied) {
                if !self.allow_out_of_order {
                    return Err(MigrationError::OutOfOrder {
                        version: unit.version(),
                        latest_applied,
                    });
                }
                tracing::warn!(
                    version = unit.version(),
                    latest_applied,
                    "applying migration out of order"
                );
            }
        }

        Ok(pending)
    }

    /// Versions `migrate_up(target)` would apply, without changing anything
    pub async fn plan(&self, conn: &mut dyn DatabaseConnection, target: Option<i64>) -> Result<Vec<i64>, MigrationError> {
        let view = self.read_ledger(conn).await?;
        Ok(self
            .pending(&view, target)?
            .iter()
            .map(|u| u.version())
            .collect())
    }

    /// Apply every pending version up to `target`
    ///
    /// Pre-flight failures (ledger access, out-of-order history) are returned as
    /// errors. A failing unit halts the batch and is reported in the returned
    /// [`MigrationReport`]; versions applied before it stay applied.
    pub async fn migrate_up(
        &self,
        conn: &mut dyn DatabaseConnection,
        target: Option<i64>,
    ) -> Result<MigrationReport, MigrationError> {
        let start_time = Instant::now();
        let mut state = RunnerState::Idle;
        let mut report = MigrationReport::empty(MigrationDirection::Up);

        self.transition(&mut state, RunnerState::Planning);
        self.ledger
            .ensure_table(conn)
            .await
            .map_err(MigrationError::Ledger)?;

        let view = self.read_ledger(conn).await?;
        report.warnings = view.warnings.clone();
        let pending = self.pending(&view, target)?;

        if pending.is_empty() {
            tracing::info!("database is up to date");
        }

        for unit in pending {
            match self.apply_unit(conn, unit.as_ref(), &mut state).await {
                Ok(()) => {
                    tracing::info!(version = unit.version(), name = unit.name(), "applied migration");
                    report.applied_versions.push(unit.version());
                }
                Err(err) => {
                    tracing::error!(version = unit.version(), name = unit.name(), error = %err, "migration failed");
                    self.transition(&mut state, RunnerState::Failed(unit.version()));
                    report.failed_version = Some(unit.version());
                    report.error = Some(err);
                    break;
                }
            }
        }

        report.final_state = state;
        report.cleanup_recommended = report.error.is_none() && !report.applied_versions.is_empty();
        report.execution_time_ms = start_time.elapsed().as_millis();
        Ok(report)
    }

    /// Run one unit's `up` and record it, inside a transaction when the dialect allows
    async fn apply_unit(
        &self,
        conn: &mut dyn DatabaseConnection,
        unit: &dyn MigrationUnit,
        state: &mut RunnerState,
    ) -> Result<(), MigrationError> {
        let version = unit.version();
        let transactional = conn.dialect().supports_transactional_ddl();
        let apply_error = |source: OrmError| MigrationError::Apply {
            version,
            name: unit.name().to_string(),
            direction: MigrationDirection::Up,
            source,
        };

        if transactional {
            conn.begin_transaction().await.map_err(apply_error)?;
        }

        self.transition(state, RunnerState::Applying(version));
        let result = {
            let mut schema = SchemaManager::new(&mut *conn);
            unit.up(&mut schema).await.map_err(apply_error)
        };

        let result = match result {
            Ok(()) => {
                self.transition(state, RunnerState::Recording(version));
                self.ledger
                    .record(&mut *conn, version, unit.name())
                    .await
                    .map_err(MigrationError::Ledger)
            }
            Err(err) => Err(err),
        };

        finish_transaction(conn, transactional, result).await?;
        self.transition(state, RunnerState::Idle);
        Ok(())
    }

    /// Ledger compared with the registry; read-only
    pub async fn status(&self, conn: &mut dyn DatabaseConnection) -> Result<MigrationStatus, MigrationError> {
        let view = self.read_ledger(conn).await?;
        let pending_versions = self
            .units
            .iter()
            .map(|u| u.version())
            .filter(|v| !view.applied_known.contains(v))
            .collect();

        Ok(MigrationStatus {
            current_version: view.applied_known.iter().next_back().copied(),
            applied: view.entries,
            pending_versions,
            total_known_versions: self.units.len(),
            warnings: view.warnings,
        })
    }

    /// Run `verify` for every applied unit that defines it; read-only
    ///
    /// A check that errors is recorded as failed and the remaining checks still run.
    pub async fn verify_all(&self, conn: &mut dyn DatabaseConnection) -> Result<BTreeMap<i64, bool>, MigrationError> {
        let view = self.read_ledger(conn).await?;
        let mut results = BTreeMap::new();

        for version in &view.applied_known {
            let Some(unit) = self.unit(*version) else {
                continue;
            };
            let mut schema = SchemaManager::new(&mut *conn);
            let outcome = match unit.verify(&mut schema).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(version, name = unit.name(), error = %err, "verification errored");
                    Some(false)
                }
            };
            if let Some(passed) = outcome {
                if !passed {
                    tracing::warn!(version, name = unit.name(), "verification failed");
                }
                results.insert(*version, passed);
            }
        }

        Ok(results)
    }
}

/// Commit on success, roll back on failure
pub(crate) async fn finish_transaction(
    conn: &mut dyn DatabaseConnection,
    transactional: bool,
    result: Result<(), MigrationError>,
) -> Result<(), MigrationError> {
    if !transactional {
        return result;
    }

    match result {
        Ok(()) => conn.commit().await.map_err(MigrationError::Ledger),
        Err(err) => {
            if let Err(rollback_err) = conn.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
