//! Migration Registry - explicitly registered migration units

use std::sync::Arc;

use super::definitions::{MigrationError, MigrationUnit};
use super::units;

/// Set of migration units known to the application
#[derive(Default, Clone)]
pub struct MigrationRegistry {
    units: Vec<Arc<dyn MigrationUnit>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The application's built-in units
    pub fn builtin() -> Self {
        Self::new()
            .with(units::Baseline)
            .with(units::AddItemActiveFlag)
            .with(units::CreateSearchTables)
    }

    /// Register a unit
    pub fn register(&mut self, unit: impl MigrationUnit + 'static) -> &mut Self {
        self.units.push(Arc::new(unit));
        self
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, unit: impl MigrationUnit + 'static) -> Self {
        self.register(unit);
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// All units ascending by version
    ///
    /// Fails before anything touches the database if two units share a version.
    /// Gaps between versions are allowed.
    pub fn load_all(&self) -> Result<Vec<Arc<dyn MigrationUnit>>, MigrationError> {
        let mut units = self.units.clone();
        units.sort_by_key(|u| u.version());

        for pair in units.windows(2) {
            if pair[0].version() == pair[1].version() {
                return Err(MigrationError::DuplicateVersion {
                    version: pair[0].version(),
                    first: pair[0].name().to_string(),
                    second: pair[1].name().to_string(),
                });
            }
        }

        Ok(units)
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.units.iter().map(|u| (u.version(), u.name().to_string())))
            .finish()
    }
}
