//! End-to-end runs of the built-in units against in-memory SQLite

mod common;

use common::*;
use tidemark_orm::migrations::units::{AddItemActiveFlag, Baseline, CreateSearchTables};
use tidemark_orm::{
    DatabaseConnection, MigrationRegistry, MigrationRollback, MigrationRunner, MigrationUnit, MigrationWarning,
    SchemaManager, VersionLedger,
};

fn runner(registry: MigrationRegistry) -> MigrationRunner {
    MigrationRunner::new(&registry, VersionLedger::default()).unwrap()
}

#[tokio::test]
async fn baseline_and_active_flag_apply_once() {
    let (_pool, mut conn) = memory_db().await;
    let runner = runner(MigrationRegistry::new().with(Baseline).with(AddItemActiveFlag));

    let report = runner.migrate_up(&mut conn, None).await.unwrap();
    assert_eq!(report.applied_versions, vec![1, 3]);
    assert!(report.cleanup_recommended);
    assert_eq!(ledger_versions(&mut conn).await, vec![1, 3]);

    let report = runner.migrate_up(&mut conn, None).await.unwrap();
    assert!(report.applied_versions.is_empty());
    assert!(report.is_success());
}

#[tokio::test]
async fn active_flag_rerun_backfills_existing_rows() {
    let (_pool, mut conn) = memory_db().await;
    runner(MigrationRegistry::new().with(Baseline).with(AddItemActiveFlag))
        .migrate_up(&mut conn, None)
        .await
        .unwrap();

    conn.execute(
        "INSERT INTO items (name, is_active) VALUES ('null flag', NULL), ('zero flag', 0), ('set', 1)",
        &[],
    )
    .await
    .unwrap();

    let mut schema = SchemaManager::new(&mut conn);
    AddItemActiveFlag
        .up(&mut schema)
        .await
        .expect("column already exists must not surface an error");

    assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM items WHERE is_active = 1").await, 3);
    assert_eq!(
        count(&mut conn, "SELECT COUNT(*) FROM items WHERE is_active IS NULL OR is_active = 0").await,
        0
    );
}

#[tokio::test]
async fn active_flag_adopts_column_added_outside_the_runner() {
    let (_pool, mut conn) = memory_db().await;
    conn.execute(
        "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name VARCHAR(255) NOT NULL, \
         barcode VARCHAR(64), quantity INTEGER NOT NULL DEFAULT 0, \
         created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP, is_active INTEGER)",
        &[],
    )
    .await
    .unwrap();
    conn.execute("INSERT INTO items (name) VALUES ('legacy')", &[])
        .await
        .unwrap();

    let report = runner(MigrationRegistry::builtin())
        .migrate_up(&mut conn, None)
        .await
        .unwrap();
    assert_eq!(report.applied_versions, vec![1, 3, 13]);
    assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM items WHERE is_active = 1").await, 1);
}

#[tokio::test]
async fn search_tables_roll_back_cleanly() {
    let (_pool, mut conn) = memory_db().await;
    let runner = runner(MigrationRegistry::new().with(CreateSearchTables));

    runner.migrate_up(&mut conn, None).await.unwrap();
    for name in [
        "search_history",
        "saved_searches",
        "idx_search_history_searched_at",
        "idx_saved_searches_name",
    ] {
        let sql = format!("SELECT COUNT(*) FROM sqlite_master WHERE name = '{}'", name);
        assert_eq!(count(&mut conn, &sql).await, 1, "{} should exist", name);
    }

    let report = runner.migrate_down(&mut conn, 1).await.unwrap();
    assert_eq!(report.applied_versions, vec![13]);

    assert_eq!(
        count(
            &mut conn,
            "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('search_history', 'saved_searches', \
             'idx_search_history_searched_at', 'idx_saved_searches_name')"
        )
        .await,
        0
    );
    assert!(!ledger_versions(&mut conn).await.contains(&13));
}

#[tokio::test]
async fn unknown_ledger_version_is_reported_as_diverged() {
    let (_pool, mut conn) = memory_db().await;
    let runner = runner(MigrationRegistry::builtin());

    runner.ledger().ensure_table(&mut conn).await.unwrap();
    runner.ledger().record(&mut conn, 99, "from_another_branch").await.unwrap();

    let status = runner.status(&mut conn).await.unwrap();
    assert!(status.has_diverged());
    assert_eq!(
        status.warnings,
        vec![MigrationWarning::DivergedHistory {
            version: 99,
            name: "from_another_branch".to_string(),
        }]
    );
    assert_eq!(status.pending_versions, vec![1, 3, 13]);
    assert_eq!(status.current_version, None);
    assert_eq!(status.applied.len(), 1);

    let report = runner.migrate_up(&mut conn, None).await.unwrap();
    assert_eq!(report.applied_versions, vec![1, 3, 13]);
    assert_eq!(report.warnings.len(), 1);

    let status = runner.status(&mut conn).await.unwrap();
    assert_eq!(status.current_version, Some(13));
    assert!(status.is_current());

    // Rolling back skips the unknown version and leaves its entry alone.
    let report = runner.migrate_down(&mut conn, 1).await.unwrap();
    assert_eq!(report.applied_versions, vec![13]);
    assert_eq!(ledger_versions(&mut conn).await, vec![1, 3, 99]);
}
