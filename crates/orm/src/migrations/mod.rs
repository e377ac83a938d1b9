//! Migration System
//!
//! Versioned migration units, the registry that orders them, the ledger that
//! records them and the runner that applies and rolls them back.

pub mod definitions;
pub mod ledger;
pub mod lock;
pub mod registry;
pub mod rollback;
pub mod runner;
pub mod schema_builder;
pub mod schema_manager;
pub mod startup;
pub mod units;

pub use definitions::{
    LedgerEntry, MigrationDirection, MigrationError, MigrationReport, MigrationStatus, MigrationUnit,
    MigrationWarning, RunnerState, DEFAULT_LEDGER_TABLE,
};
pub use ledger::VersionLedger;
pub use lock::{MigrationLock, DEFAULT_LOCK_KEY};
pub use registry::MigrationRegistry;
pub use rollback::MigrationRollback;
pub use runner::MigrationRunner;
pub use schema_builder::{IndexBuilder, SchemaBuilder, TableBuilder};
pub use schema_manager::SchemaManager;
pub use startup::{run_migrations, MigrationCommand, MigrationSession};
