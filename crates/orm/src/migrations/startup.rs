//! In-process migration execution helpers
//!
//! Connects using an [`AppConfig`], takes the migration lock for mutating
//! commands and gives the connection, lock and pool back on every exit path.

use std::collections::BTreeMap;
use std::time::Duration;

use tidemark_core::{AppConfig, AppConfigTrait};

use super::definitions::{MigrationDirection, MigrationError, MigrationReport, MigrationStatus};
use super::ledger::VersionLedger;
use super::lock::{MigrationLock, DEFAULT_LOCK_KEY};
use super::registry::MigrationRegistry;
use super::rollback::MigrationRollback;
use super::runner::MigrationRunner;
use crate::backends::{DatabaseConnection, DatabasePool, SqlDialect, SqlxConnection};

/// A mutating migration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    /// Apply pending versions up to an optional target
    Up { target: Option<i64> },
    /// Roll back the most recent `steps` versions
    Down { steps: usize },
    /// Roll back every version above `target`
    DownTo { target: i64 },
}

impl MigrationCommand {
    /// Map a direction and optional target onto a command
    ///
    /// `Down` without a target rolls back a single version.
    pub fn from_direction(direction: MigrationDirection, target: Option<i64>) -> Self {
        match (direction, target) {
            (MigrationDirection::Up, target) => MigrationCommand::Up { target },
            (MigrationDirection::Down, Some(target)) => MigrationCommand::DownTo { target },
            (MigrationDirection::Down, None) => MigrationCommand::Down { steps: 1 },
        }
    }
}

/// An open pool plus a runner configured from [`AppConfig`]
pub struct MigrationSession {
    pool: DatabasePool,
    runner: MigrationRunner,
    use_lock: bool,
    lock_timeout: Duration,
}

impl MigrationSession {
    /// Validate `config`, connect and build the runner
    pub async fn open(config: &AppConfig, registry: &MigrationRegistry) -> Result<Self, MigrationError> {
        config.validate()?;

        let dialect = match &config.database.dialect {
            Some(tag) => Some(tag.parse::<SqlDialect>()?),
            None => None,
        };
        let ledger = VersionLedger::new(config.migrations.table.clone())?;
        let runner = MigrationRunner::new(registry, ledger)?
            .allow_out_of_order(config.migrations.allow_out_of_order);

        let pool = DatabasePool::connect(&config.database.url, dialect, config.database.max_connections).await?;
        tracing::info!(dialect = %pool.dialect(), table = %config.migrations.table, "migration session opened");

        Ok(Self {
            pool,
            runner,
            use_lock: config.migrations.use_lock,
            lock_timeout: Duration::from_secs(config.migrations.lock_timeout_secs),
        })
    }

    pub fn runner(&self) -> &MigrationRunner {
        &self.runner
    }

    pub fn dialect(&self) -> SqlDialect {
        self.pool.dialect()
    }

    /// Acquire a dedicated connection
    pub async fn connection(&self) -> Result<SqlxConnection, MigrationError> {
        Ok(self.pool.acquire().await?)
    }

    pub async fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let mut conn = self.connection().await?;
        self.runner.status(&mut conn).await
    }

    pub async fn verify(&self) -> Result<BTreeMap<i64, bool>, MigrationError> {
        let mut conn = self.connection().await?;
        self.runner.verify_all(&mut conn).await
    }

    /// Versions `Up { target }` would apply
    pub async fn plan(&self, target: Option<i64>) -> Result<Vec<i64>, MigrationError> {
        let mut conn = self.connection().await?;
        self.runner.plan(&mut conn, target).await
    }

    /// Run a mutating command on one connection, under the migration lock if enabled
    pub async fn execute(&self, command: MigrationCommand) -> Result<MigrationReport, MigrationError> {
        let mut conn = self.connection().await?;

        let lock = if self.use_lock {
            Some(MigrationLock::acquire(&mut conn, DEFAULT_LOCK_KEY, self.lock_timeout).await?)
        } else {
            None
        };

        let result = self.dispatch(&mut conn, command).await;

        if let Some(lock) = lock {
            if let Err(err) = lock.release(&mut conn).await {
                tracing::warn!(error = %err, "migration lock was not released cleanly");
            }
        }

        result
    }

    async fn dispatch(
        &self,
        conn: &mut dyn DatabaseConnection,
        command: MigrationCommand,
    ) -> Result<MigrationReport, MigrationError> {
        match command {
            MigrationCommand::Up { target } => self.runner.migrate_up(conn, target).await,
            MigrationCommand::Down { steps } => self.runner.migrate_down(conn, steps).await,
            MigrationCommand::DownTo { target } => self.runner.migrate_down_to(conn, target).await,
        }
    }

    /// Close the pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Run migrations once at startup
///
/// Returns the report of a fully successful batch. A unit failure is returned
/// as its `MigrationError` after the partial report has been logged, so a host
/// can refuse to start.
pub async fn run_migrations(
    config: &AppConfig,
    registry: &MigrationRegistry,
    direction: MigrationDirection,
    target: Option<i64>,
) -> Result<MigrationReport, MigrationError> {
    let session = MigrationSession::open(config, registry).await?;
    let result = session
        .execute(MigrationCommand::from_direction(direction, target))
        .await;
    session.close().await;

    let report = result?;
    if report.is_success() {
        if report.applied_versions.is_empty() {
            tracing::debug!(%direction, "no migrations to run");
        } else {
            tracing::info!(
                %direction,
                count = report.applied_versions.len(),
                elapsed_ms = report.execution_time_ms as u64,
                "migrations complete"
            );
        }
    } else {
        tracing::error!(
            %direction,
            completed = ?report.applied_versions,
            failed = ?report.failed_version,
            "migration batch halted"
        );
    }
    report.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_direction() {
        assert_eq!(
            MigrationCommand::from_direction(MigrationDirection::Up, Some(3)),
            MigrationCommand::Up { target: Some(3) }
        );
        assert_eq!(
            MigrationCommand::from_direction(MigrationDirection::Down, None),
            MigrationCommand::Down { steps: 1 }
        );
        assert_eq!(
            MigrationCommand::from_direction(MigrationDirection::Down, Some(1)),
            MigrationCommand::DownTo { target: 1 }
        );
    }

    #[tokio::test]
    async fn test_invalid_table_rejected_before_connecting() {
        let mut config = AppConfig::for_database("sqlite::memory:");
        config.migrations.table = "not a table".to_string();

        let result = run_migrations(&config, &MigrationRegistry::builtin(), MigrationDirection::Up, None).await;
        assert!(matches!(result, Err(MigrationError::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_dialect_rejected() {
        let mut config = AppConfig::for_database("sqlite::memory:");
        config.database.dialect = Some("oracle".to_string());

        let result = run_migrations(&config, &MigrationRegistry::builtin(), MigrationDirection::Up, None).await;
        assert!(matches!(result, Err(MigrationError::UnsupportedDialect(tag)) if tag == "oracle"));
    }
}
