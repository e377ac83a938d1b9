//! `run_migrations` against a file-backed SQLite database

use tempfile::TempDir;
use tidemark_core::AppConfig;
use tidemark_orm::{
    run_migrations, MigrationCommand, MigrationDirection, MigrationError, MigrationRegistry, MigrationSession,
};

fn config_for(dir: &TempDir) -> AppConfig {
    let path = dir.path().join("inventory.db");
    AppConfig::for_database(format!("sqlite://{}?mode=rwc", path.display()))
}

#[tokio::test]
async fn test_startup_migrations_persist_across_runs() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);
    let registry = MigrationRegistry::builtin();

    let report = run_migrations(&config, &registry, MigrationDirection::Up, None)
        .await
        .unwrap();
    assert_eq!(report.applied_versions, vec![1, 3, 13]);
    assert!(report.cleanup_recommended);

    let report = run_migrations(&config, &registry, MigrationDirection::Up, None)
        .await
        .unwrap();
    assert!(report.applied_versions.is_empty());
    assert!(!report.cleanup_recommended);

    let session = MigrationSession::open(&config, &registry).await.unwrap();
    let status = session.status().await.unwrap();
    assert_eq!(status.current_version, Some(13));
    assert!(status.is_current());

    let verified = session.verify().await.unwrap();
    assert!(verified.values().all(|ok| *ok));
    assert_eq!(verified.len(), 3);
    session.close().await;
}

#[tokio::test]
async fn test_startup_target_and_rollback() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);
    let registry = MigrationRegistry::builtin();

    let session = MigrationSession::open(&config, &registry).await.unwrap();
    assert_eq!(session.plan(Some(3)).await.unwrap(), vec![1, 3]);

    let report = session
        .execute(MigrationCommand::Up { target: Some(3) })
        .await
        .unwrap();
    assert_eq!(report.applied_versions, vec![1, 3]);
    assert_eq!(session.status().await.unwrap().pending_versions, vec![13]);
    session.close().await;

    run_migrations(&config, &registry, MigrationDirection::Up, None)
        .await
        .unwrap();
    let report = run_migrations(&config, &registry, MigrationDirection::Down, None)
        .await
        .unwrap();
    assert_eq!(report.applied_versions, vec![13]);

    // Rolling back v3 needs DROP COLUMN, which SQLite cannot do.
    let result = run_migrations(&config, &registry, MigrationDirection::Down, Some(1)).await;
    assert!(matches!(result, Err(MigrationError::Irreversible { version: 3, .. })));

    let session = MigrationSession::open(&config, &registry).await.unwrap();
    let status = session.status().await.unwrap();
    assert_eq!(status.current_version, Some(3));
    session.close().await;
}

#[tokio::test]
async fn test_custom_ledger_table() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(&dir);
    config.migrations.table = "inventory_versions".to_string();

    run_migrations(&config, &MigrationRegistry::builtin(), MigrationDirection::Up, None)
        .await
        .unwrap();

    let session = MigrationSession::open(&config, &MigrationRegistry::builtin())
        .await
        .unwrap();
    let mut conn = session.connection().await.unwrap();
    let mut schema = tidemark_orm::SchemaManager::new(&mut conn);
    assert!(schema.has_table("inventory_versions").await.unwrap());
    assert!(!schema.has_table("schema_migrations").await.unwrap());
    drop(conn);
    session.close().await;
}
