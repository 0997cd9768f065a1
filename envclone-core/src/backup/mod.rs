//! Point-in-time table snapshots and restore.
//!
//! A backup is one JSON document per snapshot:
//! `{metadata: {backupId, environment, timestamp, operation, tables}, data: {table: [rows]}}`.
//! A separate ledger (`metadata.json`) lists the newest 50 backups.
//!
//! Both directions are best effort per table: a table that cannot be read
//! (backup) or written (restore) is logged and skipped, the rest proceed.
//! Restore is not transactional across tables.

mod ledger;

pub use ledger::{Backup, BackupLedger, LEDGER_CAPACITY, LEDGER_FILE};

use crate::config::TableCatalog;
use crate::environment::Environment;
use crate::error::EnvCloneError;
use crate::models::{Record, WIPE_SENTINEL};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rows inserted per call during restore.
pub const RESTORE_BATCH_SIZE: usize = 100;

const ID_SUFFIX_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Header of a backup document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub backup_id: String,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    /// Tables requested for the snapshot
    pub tables: Vec<String>,
}

/// Full backup document as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub metadata: BackupMetadata,
    pub data: IndexMap<String, Vec<Record>>,
}

/// Outcome of [`BackupManager::create_backup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    pub backup_id: String,
    pub file_path: PathBuf,
    pub tables_backed_up: Vec<String>,
    /// Requested tables that could not be read
    pub skipped_tables: Vec<String>,
    pub record_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of [`BackupManager::restore_backup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub restored_tables: Vec<String>,
    pub failed_tables: Vec<String>,
    pub records_restored: u64,
}

/// Owner of the on-disk backup store.
#[derive(Debug, Clone)]
pub struct BackupManager {
    directory: PathBuf,
    catalog: TableCatalog,
}

/// Replaces anything outside `[A-Za-z0-9_-]` so a label is safe in a file name.
fn file_safe(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Generates `backup_<env>_<operation>_<timestamp>_<6 random chars>`.
///
/// The timestamp is ISO-8601 with `:` and `.` replaced by `-`.
pub fn generate_backup_id(environment: &str, operation: &str, timestamp: DateTime<Utc>) -> String {
    let stamp = timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| char::from(ID_SUFFIX_CHARS[rng.random_range(0..ID_SUFFIX_CHARS.len())]))
        .collect();
    format!(
        "backup_{}_{}_{}_{}",
        file_safe(environment),
        file_safe(operation),
        stamp,
        suffix
    )
}

impl BackupManager {
    /// Creates a manager storing backups in `directory`.
    ///
    /// `catalog` supplies the table order and the key column of each table.
    pub fn new(directory: impl Into<PathBuf>, catalog: TableCatalog) -> Self {
        Self {
            directory: directory.into(),
            catalog,
        }
    }

    /// Directory holding backup files and the ledger.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Catalog-ordered tables followed by the ones the catalog does not list.
    fn in_dependency_order(&self, tables: &[String]) -> Vec<String> {
        let (mut ordered, unlisted) = self.catalog.order_tables(tables);
        ordered.extend(unlisted);
        ordered
    }

    fn ledger(&self) -> BackupLedger {
        BackupLedger::in_directory(&self.directory)
    }

    /// Path of the file holding `backup_id`.
    ///
    /// # Errors
    /// Returns `BackupNotFound` for ids that are not plain file names.
    pub fn backup_path(&self, backup_id: &str) -> crate::Result<PathBuf> {
        if backup_id.is_empty() || file_safe(backup_id) != backup_id {
            return Err(EnvCloneError::BackupNotFound {
                backup_id: backup_id.to_string(),
            });
        }
        Ok(self.directory.join(format!("{}.json", backup_id)))
    }

    /// Snapshots every requested table of `environment`.
    ///
    /// Tables are captured in catalog dependency order, unlisted ones last,
    /// and each is read in full. Tables that fail to read are skipped and
    /// listed in the result. Empty tables are captured as empty.
    ///
    /// # Errors
    /// Returns an I/O or serialization error if the backup file cannot be
    /// written. Ledger update failures are logged, not returned.
    pub async fn create_backup(
        &self,
        environment: &Environment,
        tables: &[String],
        operation: &str,
    ) -> crate::Result<BackupResult> {
        let tables = self.in_dependency_order(tables);
        let timestamp = Utc::now();
        let backup_id = generate_backup_id(&environment.name, operation, timestamp);
        info!(
            "Creating backup {} of {} ({} tables)",
            backup_id,
            environment.name,
            tables.len()
        );

        tokio::fs::create_dir_all(&self.directory).await.map_err(|e| {
            EnvCloneError::io(
                format!("Failed to create backup directory {}", self.directory.display()),
                e,
            )
        })?;

        let mut data = IndexMap::new();
        let mut backed_up = Vec::new();
        let mut skipped = Vec::new();
        let mut record_count = 0u64;

        for table in &tables {
            match environment.client.select_all(table, self.catalog.key_column(table)).await {
                Ok(rows) => {
                    let count = u64::try_from(rows.len()).unwrap_or(u64::MAX);
                    info!("  {}: {} records", table, count);
                    record_count = record_count.saturating_add(count);
                    data.insert(table.clone(), rows);
                    backed_up.push(table.clone());
                }
                Err(error) => {
                    warn!("Skipping {} in backup: {}", table, error);
                    skipped.push(table.clone());
                }
            }
        }

        let document = BackupDocument {
            metadata: BackupMetadata {
                backup_id: backup_id.clone(),
                environment: environment.name.clone(),
                timestamp,
                operation: operation.to_string(),
                tables,
            },
            data,
        };

        let file_path = self.backup_path(&backup_id)?;
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| EnvCloneError::serialization("Failed to serialize backup", e))?;
        tokio::fs::write(&file_path, json).await.map_err(|e| {
            EnvCloneError::io(format!("Failed to write backup {}", file_path.display()), e)
        })?;

        if let Err(error) = self
            .ledger()
            .record(Backup {
                id: backup_id.clone(),
                environment: environment.name.clone(),
                timestamp,
                file_path: file_path.clone(),
                tables: backed_up.clone(),
                record_count,
                operation: operation.to_string(),
            })
            .await
        {
            warn!("Backup {} written but ledger not updated: {}", backup_id, error);
        }

        info!("✓ Backup {}: {} records in {}", backup_id, record_count, file_path.display());
        Ok(BackupResult {
            backup_id,
            file_path,
            tables_backed_up: backed_up,
            skipped_tables: skipped,
            record_count,
            timestamp,
        })
    }

    /// Reads a backup document.
    ///
    /// # Errors
    /// Returns `BackupNotFound` if no file exists for the id, or an I/O or
    /// serialization error if it cannot be read.
    pub async fn load_backup(&self, backup_id: &str) -> crate::Result<BackupDocument> {
        let path = self.backup_path(backup_id)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EnvCloneError::BackupNotFound {
                    backup_id: backup_id.to_string(),
                });
            }
            Err(e) => {
                return Err(EnvCloneError::io(
                    format!("Failed to read backup {}", path.display()),
                    e,
                ));
            }
        };
        serde_json::from_str(&contents)
            .map_err(|e| EnvCloneError::serialization(format!("Invalid backup {}", backup_id), e))
    }

    /// Replaces the contents of every captured table in `target`.
    ///
    /// Captured tables are put in catalog dependency order, unlisted ones
    /// last. Every table is wiped with the delete-all idiom in reverse order
    /// first, then captured rows are inserted in forward order in batches of
    /// [`RESTORE_BATCH_SIZE`]. A table whose wipe or insert fails is listed
    /// in `failed_tables`; rows from batches that succeeded before the
    /// failure still count toward `records_restored`.
    ///
    /// # Errors
    /// Returns `BackupNotFound` or a read error if the backup cannot be loaded.
    pub async fn restore_backup(&self, backup_id: &str, target: &Environment) -> crate::Result<RestoreResult> {
        let document = self.load_backup(backup_id).await?;
        info!("Restoring backup {} into {}", backup_id, target.name);

        let captured: Vec<String> = document.data.keys().cloned().collect();
        let tables = self.in_dependency_order(&captured);
        let mut result = RestoreResult::default();

        for table in tables.iter().rev() {
            let key = self.catalog.key_column(table);
            if let Err(error) = target.client.delete_all(table, key, WIPE_SENTINEL).await
                && !error.is_no_rows()
            {
                warn!("Skipping restore of {}: wipe failed: {}", table, error);
                result.failed_tables.push(table.clone());
            }
        }

        for table in &tables {
            if result.failed_tables.contains(table) {
                continue;
            }
            let rows = document.data.get(table).map(Vec::as_slice).unwrap_or_default();

            let mut restored = 0u64;
            let mut failed = false;
            for batch in rows.chunks(RESTORE_BATCH_SIZE) {
                match target.client.insert(table, batch).await {
                    Ok(()) => {
                        restored =
                            restored.saturating_add(u64::try_from(batch.len()).unwrap_or(u64::MAX));
                    }
                    Err(error) => {
                        warn!("Restore of {} stopped: {}", table, error);
                        failed = true;
                        break;
                    }
                }
            }

            result.records_restored = result.records_restored.saturating_add(restored);
            if failed {
                result.failed_tables.push(table.clone());
            } else {
                info!("  {}: {} records restored", table, restored);
                result.restored_tables.push(table.clone());
            }
        }

        info!(
            "✓ Restore finished: {} records, {} tables restored, {} failed",
            result.records_restored,
            result.restored_tables.len(),
            result.failed_tables.len()
        );
        Ok(result)
    }

    /// Lists the ledger, newest first. Empty when no backup was ever made.
    ///
    /// # Errors
    /// Returns an I/O or serialization error if the ledger is unreadable.
    pub async fn list_backups(&self) -> crate::Result<Vec<Backup>> {
        self.ledger().load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_id_format() {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.456Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = generate_backup_id("prod", "clone_prod_to_test", timestamp);

        assert!(id.starts_with("backup_prod_clone_prod_to_test_2024-05-01T10-20-30-456Z_"));
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(!id.contains(':') && !id.contains('.'));
    }

    #[test]
    fn test_backup_path_rejects_traversal() {
        let manager = BackupManager::new("backups", TableCatalog::builtin().unwrap());
        assert!(manager.backup_path("../etc/passwd").is_err());
        assert!(manager.backup_path("").is_err());
        assert_eq!(
            manager.backup_path("backup_x").unwrap(),
            PathBuf::from("backups/backup_x.json")
        );
    }

    #[test]
    fn test_labels_are_file_safe() {
        assert_eq!(file_safe("my env/1"), "my-env-1");
    }
}
