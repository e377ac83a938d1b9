use async_trait::async_trait;

use crate::error::OrmResult;
use crate::migrations::{MigrationUnit, SchemaManager};

/// Documents the `items` table the application started with
///
/// Existing databases already have it, so `up` only creates it when absent.
/// The baseline cannot be rolled back.
pub struct Baseline;

const COLUMNS: &[&str] = &["id", "name", "barcode", "quantity", "created_at"];

#[async_trait]
impl MigrationUnit for Baseline {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "baseline"
    }

    fn reversible(&self) -> bool {
        false
    }

    async fn up(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        schema
            .create_table("items", |t| {
                t.if_not_exists();
                t.id("id");
                t.string_not_null("name", Some(255));
                t.string("barcode", Some(64));
                t.integer_default("quantity", 0);
                t.timestamp("created_at");
            })
            .await
    }

    async fn verify(&self, schema: &mut SchemaManager<'_>) -> OrmResult<Option<bool>> {
        if !schema.has_table("items").await? {
            return Ok(Some(false));
        }
        for column in COLUMNS {
            if !schema.has_column("items", column).await? {
                return Ok(Some(false));
            }
        }
        Ok(Some(true))
    }
}
