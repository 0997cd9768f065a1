//! Backup creation, ledger and restore tests.
//!
//! This test suite covers:
//! - Backup document layout on disk
//! - Backup/restore round trip into an empty target
//! - Ledger capacity and ordering
//! - Restore batching and per-table failures
//! - Dependency order of captured tables, wipes and inserts

use envclone_core::{
    backup::{BackupManager, LEDGER_CAPACITY, LEDGER_FILE, RESTORE_BATCH_SIZE},
    config::{EnvironmentConfig, TableCatalog},
    environment::Environment,
    error::EnvCloneError,
    store::{MemoryStore, StoreCall, TableRules},
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::tempdir;

fn environment(name: &str, store: &Arc<MemoryStore>) -> Environment {
    Environment::new(
        EnvironmentConfig::new(name, format!("http://{}.invalid", name), "service-key"),
        store.clone(),
    )
}

fn tables(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

fn manager(dir: &std::path::Path) -> BackupManager {
    BackupManager::new(dir, TableCatalog::builtin().unwrap())
}

fn numbered_rows(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"id": format!("row-{}", i), "name": format!("Row {}", i)}))
        .collect()
}

fn ids(rows: &[envclone_core::Record]) -> BTreeSet<String> {
    rows.iter()
        .map(|row| row["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_backup_document_layout() {
    let dir = tempdir().unwrap();
    let store = Arc::new(
        MemoryStore::new()
            .with_table("zone_areas", numbered_rows(3))
            .with_empty_table("categories"),
    );

    let result = manager(dir.path())
        .create_backup(
            &environment("test", &store),
            &tables(&["zone_areas", "categories", "missing_table"]),
            "manual",
        )
        .await
        .unwrap();

    assert_eq!(result.record_count, 3);
    assert_eq!(result.tables_backed_up, vec!["zone_areas", "categories"]);
    assert_eq!(result.skipped_tables, vec!["missing_table"]);
    assert!(result.backup_id.starts_with("backup_test_manual_"));

    let raw = std::fs::read_to_string(&result.file_path).unwrap();
    let document: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(document["metadata"]["backupId"], json!(result.backup_id));
    assert_eq!(document["metadata"]["environment"], json!("test"));
    assert_eq!(document["metadata"]["operation"], json!("manual"));
    assert_eq!(document["data"]["zone_areas"].as_array().unwrap().len(), 3);
    assert_eq!(document["data"]["categories"], json!([]));
    assert!(dir.path().join(LEDGER_FILE).is_file());

    // backups only read
    assert!(store.calls().iter().all(|call| !call.is_write()));
}

#[tokio::test]
async fn test_round_trip_into_empty_target() {
    let dir = tempdir().unwrap();
    let source = Arc::new(
        MemoryStore::new()
            .with_table("zone_areas", numbered_rows(5))
            .with_table("settings", vec![json!({"key": "currency", "value": "DZD"})]),
    );
    let target = Arc::new(
        MemoryStore::new()
            .with_empty_table("zone_areas")
            .with_empty_table("settings"),
    );
    let manager = manager(dir.path());

    let backup = manager
        .create_backup(&environment("prod", &source), &tables(&["zone_areas", "settings"]), "snapshot")
        .await
        .unwrap();
    let restored = manager
        .restore_backup(&backup.backup_id, &environment("test", &target))
        .await
        .unwrap();

    assert_eq!(restored.records_restored, 6);
    assert_eq!(restored.restored_tables, vec!["zone_areas", "settings"]);
    assert!(restored.failed_tables.is_empty());
    assert_eq!(ids(&target.rows("zone_areas")), ids(&source.rows("zone_areas")));
    assert_eq!(target.rows("settings"), source.rows("settings"));

    // settings are wiped by their `key` column
    assert!(target.calls().contains(&StoreCall::DeleteAll {
        table: "settings".to_string(),
        column: "key".to_string(),
    }));
}

#[tokio::test]
async fn test_restore_replaces_existing_rows() {
    let dir = tempdir().unwrap();
    let source = Arc::new(MemoryStore::new().with_table("zone_areas", numbered_rows(2)));
    let target = Arc::new(
        MemoryStore::new().with_table("zone_areas", vec![json!({"id": "stale", "name": "Stale"})]),
    );
    let manager = manager(dir.path());

    let backup = manager
        .create_backup(&environment("prod", &source), &tables(&["zone_areas"]), "snapshot")
        .await
        .unwrap();
    manager
        .restore_backup(&backup.backup_id, &environment("test", &target))
        .await
        .unwrap();

    let restored = ids(&target.rows("zone_areas"));
    assert!(!restored.contains("stale"));
    assert_eq!(restored.len(), 2);
}

#[tokio::test]
async fn test_restore_inserts_in_batches() {
    let dir = tempdir().unwrap();
    let source = Arc::new(MemoryStore::new().with_table("zone_areas", numbered_rows(250)));
    let target = Arc::new(
        MemoryStore::new()
            .with_empty_table("zone_areas")
            .with_rules("zone_areas", TableRules::default().max_batch(RESTORE_BATCH_SIZE)),
    );
    let manager = manager(dir.path());

    let backup = manager
        .create_backup(&environment("prod", &source), &tables(&["zone_areas"]), "snapshot")
        .await
        .unwrap();
    let restored = manager
        .restore_backup(&backup.backup_id, &environment("test", &target))
        .await
        .unwrap();

    assert_eq!(restored.records_restored, 250);
    let batches: Vec<usize> = target
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            StoreCall::Insert { rows, .. } => Some(rows),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![100, 100, 50]);
}

#[tokio::test]
async fn test_restore_reports_failed_tables() {
    let dir = tempdir().unwrap();
    let source = Arc::new(
        MemoryStore::new()
            .with_table("zone_areas", numbered_rows(2))
            .with_table("categories", numbered_rows(2)),
    );
    let target = Arc::new(
        MemoryStore::new()
            .with_empty_table("zone_areas")
            .with_empty_table("categories")
            .with_rules("zone_areas", TableRules::default().deny_deletes()),
    );
    let manager = manager(dir.path());

    let backup = manager
        .create_backup(&environment("prod", &source), &tables(&["zone_areas", "categories"]), "snapshot")
        .await
        .unwrap();
    let restored = manager
        .restore_backup(&backup.backup_id, &environment("test", &target))
        .await
        .unwrap();

    assert_eq!(restored.failed_tables, vec!["zone_areas"]);
    assert_eq!(restored.restored_tables, vec!["categories"]);
    assert_eq!(restored.records_restored, 2);
    assert!(target.rows("zone_areas").is_empty());
}

#[tokio::test]
async fn test_restore_wipes_children_first_and_inserts_parents_first() {
    let dir = tempdir().unwrap();
    let source = Arc::new(
        MemoryStore::new()
            .with_table("lofts", vec![json!({"id": "l1", "name": "Loft 1"})])
            .with_table("tasks", vec![json!({"id": "t1", "loft_id": "l1"})]),
    );
    let target = Arc::new(
        MemoryStore::new()
            .with_table("lofts", vec![json!({"id": "old-loft", "name": "Old"})])
            .with_table("tasks", vec![json!({"id": "old-task", "loft_id": "old-loft"})])
            .with_rules("tasks", TableRules::default().references("loft_id", "lofts")),
    );
    let manager = manager(dir.path());

    let backup = manager
        .create_backup(&environment("prod", &source), &tables(&["tasks", "lofts"]), "snapshot")
        .await
        .unwrap();
    assert_eq!(backup.tables_backed_up, vec!["lofts", "tasks"]);

    let restored = manager
        .restore_backup(&backup.backup_id, &environment("test", &target))
        .await
        .unwrap();

    assert!(restored.failed_tables.is_empty());
    assert_eq!(restored.restored_tables, vec!["lofts", "tasks"]);
    assert_eq!(restored.records_restored, 2);
    assert_eq!(target.rows("lofts"), source.rows("lofts"));
    assert_eq!(target.rows("tasks"), source.rows("tasks"));

    let writes: Vec<(bool, String)> = target
        .calls()
        .into_iter()
        .filter(StoreCall::is_write)
        .map(|call| (matches!(call, StoreCall::Insert { .. }), call.table().to_string()))
        .collect();
    assert_eq!(
        writes,
        vec![
            (false, "tasks".to_string()),
            (false, "lofts".to_string()),
            (true, "lofts".to_string()),
            (true, "tasks".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_restore_orders_document_written_out_of_order() {
    let dir = tempdir().unwrap();
    let id = "backup_test_manual_legacy";
    let document = json!({
        "metadata": {
            "backupId": id,
            "environment": "test",
            "timestamp": "2024-05-01T10:00:00Z",
            "operation": "manual",
            "tables": ["tasks", "lofts"]
        },
        "data": {
            "tasks": [{"id": "t1", "loft_id": "l1"}],
            "lofts": [{"id": "l1"}]
        }
    });
    std::fs::write(dir.path().join(format!("{}.json", id)), document.to_string()).unwrap();
    let target = Arc::new(
        MemoryStore::new()
            .with_empty_table("lofts")
            .with_empty_table("tasks")
            .with_rules("tasks", TableRules::default().references("loft_id", "lofts")),
    );

    let restored = manager(dir.path())
        .restore_backup(id, &environment("test", &target))
        .await
        .unwrap();

    assert_eq!(restored.restored_tables, vec!["lofts", "tasks"]);
    assert_eq!(target.rows("tasks").len(), 1);
}

#[tokio::test]
async fn test_unknown_backup_id() {
    let dir = tempdir().unwrap();
    let target = Arc::new(MemoryStore::new());

    let error = manager(dir.path())
        .restore_backup("backup_nope", &environment("test", &target))
        .await
        .unwrap_err();
    assert!(matches!(error, EnvCloneError::BackupNotFound { .. }));
    assert!(target.calls().is_empty());
}

#[tokio::test]
async fn test_ledger_keeps_newest_fifty() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new().with_table("zone_areas", numbered_rows(1)));
    let env = environment("test", &store);
    let manager = manager(dir.path());

    assert!(manager.list_backups().await.unwrap().is_empty());

    let mut created = Vec::new();
    for _ in 0..60 {
        let backup = manager
            .create_backup(&env, &tables(&["zone_areas"]), "manual")
            .await
            .unwrap();
        created.push(backup.backup_id);
    }

    let listed = manager.list_backups().await.unwrap();
    assert_eq!(listed.len(), LEDGER_CAPACITY);

    let expected: Vec<String> = created.iter().rev().take(LEDGER_CAPACITY).cloned().collect();
    let actual: Vec<String> = listed.iter().map(|b| b.id.clone()).collect();
    assert_eq!(actual, expected);
    assert!(listed.windows(2).all(|pair| pair[0].timestamp >= pair[1].timestamp));
}
