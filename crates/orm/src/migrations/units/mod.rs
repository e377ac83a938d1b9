//! Built-in migration units, registered by [`MigrationRegistry::builtin`](super::MigrationRegistry::builtin)

mod v001_baseline;
mod v003_item_active_flag;
mod v013_search_tables;

pub use v001_baseline::Baseline;
pub use v003_item_active_flag::AddItemActiveFlag;
pub use v013_search_tables::CreateSearchTables;
