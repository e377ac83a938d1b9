//! Migration lock - keeps two processes from migrating the same database
//!
//! PostgreSQL uses a session-level advisory lock. SQLite serializes writers
//! itself, so the lock is a no-op there.

use std::time::{Duration, Instant};

use super::definitions::MigrationError;
use crate::backends::{DatabaseConnection, SqlDialect};

/// Advisory lock key used when none is configured ("tidemark" in ASCII)
pub const DEFAULT_LOCK_KEY: i64 = 0x7469_6465_6d61_726b;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A held migration lock
///
/// Release it explicitly with [`MigrationLock::release`]; the session lock is
/// also freed by PostgreSQL when the connection closes.
#[derive(Debug)]
pub struct MigrationLock {
    key: i64,
    held: bool,
}

impl MigrationLock {
    /// Acquire the lock, polling until `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Lock` if another session keeps the lock past the timeout.
    pub async fn acquire(
        conn: &mut dyn DatabaseConnection,
        key: i64,
        timeout: Duration,
    ) -> Result<Self, MigrationError> {
        if conn.dialect() == SqlDialect::SQLite {
            return Ok(Self { key, held: false });
        }

        let start = Instant::now();
        loop {
            let row = conn
                .fetch_optional("SELECT CAST(pg_try_advisory_lock($1) AS INTEGER) AS locked", &[key.into()])
                .await
                .map_err(|e| MigrationError::Lock(format!("lock query failed: {}", e)))?;

            let locked = row
                .and_then(|r| r.get_by_index(0).ok().and_then(|v| v.as_bool()))
                .unwrap_or(false);

            if locked {
                tracing::debug!(key, "migration lock acquired");
                return Ok(Self { key, held: true });
            }

            if start.elapsed() >= timeout {
                return Err(MigrationError::Lock(format!(
                    "could not acquire migration lock {} within {} seconds; another process may be migrating",
                    key,
                    timeout.as_secs()
                )));
            }

            tracing::debug!(key, "migration lock busy, retrying");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// Whether a database-side lock is actually held
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Release the lock
    pub async fn release(mut self, conn: &mut dyn DatabaseConnection) -> Result<(), MigrationError> {
        if !self.held {
            return Ok(());
        }
        conn.execute("SELECT pg_advisory_unlock($1)", &[self.key.into()])
            .await
            .map_err(|e| MigrationError::Lock(format!("failed to release lock: {}", e)))?;
        self.held = false;
        tracing::debug!(key = self.key, "migration lock released");
        Ok(())
    }
}
