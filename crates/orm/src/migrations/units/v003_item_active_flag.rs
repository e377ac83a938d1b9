use async_trait::async_trait;

use crate::error::{OrmError, OrmResult};
use crate::migrations::{MigrationUnit, SchemaManager};

/// Adds `items.is_active` and marks every existing item active
pub struct AddItemActiveFlag;

#[async_trait]
impl MigrationUnit for AddItemActiveFlag {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "add_item_active_flag"
    }

    async fn up(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        let dialect = schema.dialect();
        let definition = format!("{} DEFAULT {}", dialect.boolean(), dialect.boolean_value(true));

        if !schema.add_column("items", "is_active", &definition).await? {
            tracing::debug!("items.is_active already present, running backfill only");
        }

        // Runs on every application so rows left NULL or 0 by older code are fixed too.
        let backfilled = schema
            .execute(&format!(
                "UPDATE items SET is_active = {} WHERE is_active IS NULL OR is_active = {}",
                dialect.boolean_value(true),
                dialect.boolean_value(false)
            ))
            .await?;
        tracing::debug!(rows = backfilled, "backfilled items.is_active");
        Ok(())
    }

    async fn down(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        if !schema.dialect().supports_drop_column() {
            return Err(OrmError::Irreversible(format!(
                "{} cannot drop items.is_active",
                schema.dialect()
            )));
        }
        schema.drop_column("items", "is_active").await
    }

    async fn verify(&self, schema: &mut SchemaManager<'_>) -> OrmResult<Option<bool>> {
        Ok(Some(schema.has_column("items", "is_active").await?))
    }
}
