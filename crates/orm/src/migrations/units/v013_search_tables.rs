use async_trait::async_trait;

use crate::error::OrmResult;
use crate::migrations::{MigrationUnit, SchemaManager};

/// Creates the search history and saved search tables
pub struct CreateSearchTables;

const TABLES: &[&str] = &["search_history", "saved_searches"];
const INDEXES: &[&str] = &["idx_search_history_searched_at", "idx_saved_searches_name"];

#[async_trait]
impl MigrationUnit for CreateSearchTables {
    fn version(&self) -> i64 {
        13
    }

    fn name(&self) -> &str {
        "create_search_tables"
    }

    async fn up(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        let mut builder = schema.builder();
        builder
            .create_table("search_history", |t| {
                t.if_not_exists();
                t.id("id");
                t.string_not_null("query", Some(255));
                t.integer_default("result_count", 0);
                t.timestamp("searched_at");
            })
            .create_index("search_history", &["searched_at"], |i| {
                i.if_not_exists();
            })
            .create_table("saved_searches", |t| {
                t.if_not_exists();
                t.id("id");
                t.string_not_null("name", Some(100));
                t.string_not_null("query", Some(255));
                t.timestamp("created_at");
            })
            .create_index("saved_searches", &["name"], |i| {
                i.unique().if_not_exists();
            });
        schema.run(builder).await
    }

    async fn down(&self, schema: &mut SchemaManager<'_>) -> OrmResult<()> {
        let mut builder = schema.builder();
        for index in INDEXES {
            builder.drop_index(index);
        }
        for table in TABLES {
            builder.drop_table(table);
        }
        schema.run(builder).await
    }

    async fn verify(&self, schema: &mut SchemaManager<'_>) -> OrmResult<Option<bool>> {
        for table in TABLES {
            if !schema.has_table(table).await? {
                return Ok(Some(false));
            }
        }
        for index in INDEXES {
            if !schema.has_index(index).await? {
                return Ok(Some(false));
            }
        }
        Ok(Some(true))
    }
}
