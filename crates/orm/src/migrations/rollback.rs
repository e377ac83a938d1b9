//! Migration Rollback - Handles rolling back applied migrations
//!
//! Runs `down` for the most recently applied versions in descending order and
//! removes each ledger entry only after its `down` succeeded.

use std::time::Instant;

use async_trait::async_trait;

use super::definitions::{
    MigrationDirection, MigrationError, MigrationReport, MigrationUnit, MigrationWarning, RunnerState,
};
use super::runner::{finish_transaction, MigrationRunner};
use super::schema_manager::SchemaManager;
use crate::backends::DatabaseConnection;
use crate::error::OrmError;

/// Extension trait for MigrationRunner to add rollback functionality
#[async_trait]
pub trait MigrationRollback {
    /// Roll back the `steps` most recently applied versions
    async fn migrate_down(
        &self,
        conn: &mut dyn DatabaseConnection,
        steps: usize,
    ) -> Result<MigrationReport, MigrationError>;

    /// Roll back every applied version above `target`
    async fn migrate_down_to(
        &self,
        conn: &mut dyn DatabaseConnection,
        target: i64,
    ) -> Result<MigrationReport, MigrationError>;
}

#[async_trait]
impl MigrationRollback for MigrationRunner {
    async fn migrate_down(
        &self,
        conn: &mut dyn DatabaseConnection,
        steps: usize,
    ) -> Result<MigrationReport, MigrationError> {
        let view = self.read_ledger(conn).await?;
        let versions: Vec<i64> = view.applied_known.iter().rev().take(steps).copied().collect();
        self.roll_back(conn, versions, view.warnings).await
    }

    async fn migrate_down_to(
        &self,
        conn: &mut dyn DatabaseConnection,
        target: i64,
    ) -> Result<MigrationReport, MigrationError> {
        let view = self.read_ledger(conn).await?;
        let versions: Vec<i64> = view
            .applied_known
            .iter()
            .rev()
            .take_while(|v| **v > target)
            .copied()
            .collect();
        self.roll_back(conn, versions, view.warnings).await
    }
}

impl MigrationRunner {
    /// Roll back `versions`, already in descending order
    async fn roll_back(
        &self,
        conn: &mut dyn DatabaseConnection,
        versions: Vec<i64>,
        warnings: Vec<MigrationWarning>,
    ) -> Result<MigrationReport, MigrationError> {
        let start_time = Instant::now();
        let mut state = RunnerState::Idle;
        let mut report = MigrationReport::empty(MigrationDirection::Down);
        report.warnings = warnings;

        self.transition(&mut state, RunnerState::Planning);
        if versions.is_empty() {
            tracing::info!("nothing to roll back");
        }

        for version in versions {
            let Some(unit) = self.unit(version).cloned() else {
                continue;
            };

            match self.revert_unit(conn, unit.as_ref(), &mut state).await {
                Ok(()) => {
                    tracing::info!(version, name = unit.name(), "rolled back migration");
                    report.applied_versions.push(version);
                }
                Err(err) => {
                    tracing::error!(version, name = unit.name(), error = %err, "rollback failed");
                    self.transition(&mut state, RunnerState::Failed(version));
                    report.failed_version = Some(version);
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

    async fn revert_unit(
        &self,
        conn: &mut dyn DatabaseConnection,
        unit: &dyn MigrationUnit,
        state: &mut RunnerState,
    ) -> Result<(), MigrationError> {
        let version = unit.version();
        if !unit.reversible() {
            return Err(MigrationError::Irreversible {
                version,
                name: unit.name().to_string(),
                reason: "migration is marked irreversible".to_string(),
            });
        }

        let transactional = conn.dialect().supports_transactional_ddl();
        let down_error = |source: OrmError| match source {
            OrmError::Irreversible(reason) => MigrationError::Irreversible {
                version,
                name: unit.name().to_string(),
                reason,
            },
            OrmError::UnsupportedOperation { dialect, operation } => MigrationError::Irreversible {
                version,
                name: unit.name().to_string(),
                reason: format!("{} cannot express {}", dialect, operation),
            },
            source => MigrationError::Apply {
                version,
                name: unit.name().to_string(),
                direction: MigrationDirection::Down,
                source,
            },
        };

        if transactional {
            conn.begin_transaction().await.map_err(down_error)?;
        }

        self.transition(state, RunnerState::Applying(version));
        let result = {
            let mut schema = SchemaManager::new(&mut *conn);
            unit.down(&mut schema).await.map_err(down_error)
        };

        let result = match result {
            Ok(()) => {
                self.transition(state, RunnerState::Recording(version));
                self.ledger()
                    .remove(&mut *conn, version)
                    .await
                    .map_err(MigrationError::Ledger)
            }
            Err(err) => Err(err),
        };

        finish_transaction(conn, transactional, result).await?;
        self.transition(state, RunnerState::Idle);
        Ok(())
    }
}
