//! Backup ledger (`metadata.json`): the most recent backups, newest first.

use crate::error::EnvCloneError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Entries kept in the ledger.
pub const LEDGER_CAPACITY: usize = 50;

/// File name of the ledger inside the backup directory.
pub const LEDGER_FILE: &str = "metadata.json";

/// Compact record of one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: String,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    pub file_path: PathBuf,
    /// Tables actually captured
    pub tables: Vec<String>,
    pub record_count: u64,
    pub operation: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    backups: Vec<Backup>,
}

/// Reader/writer for the ledger file.
#[derive(Debug, Clone)]
pub struct BackupLedger {
    path: PathBuf,
}

impl BackupLedger {
    /// Ledger stored in `directory`.
    pub fn in_directory(directory: &Path) -> Self {
        Self {
            path: directory.join(LEDGER_FILE),
        }
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the ledger; a missing file is an empty ledger.
    ///
    /// # Errors
    /// Returns an I/O or serialization error if the file exists but cannot
    /// be read or parsed.
    pub async fn load(&self) -> crate::Result<Vec<Backup>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EnvCloneError::io(
                    format!("Failed to read backup ledger {}", self.path.display()),
                    e,
                ));
            }
        };

        let document: LedgerDocument = serde_json::from_str(&contents)
            .map_err(|e| EnvCloneError::serialization("Failed to parse backup ledger", e))?;
        Ok(document.backups)
    }

    /// Adds an entry, keeping the newest [`LEDGER_CAPACITY`] entries sorted
    /// by timestamp descending. Entries with equal timestamps keep the most
    /// recently recorded first.
    ///
    /// # Errors
    /// Returns an I/O or serialization error if the ledger cannot be
    /// read or rewritten.
    pub async fn record(&self, entry: Backup) -> crate::Result<()> {
        let mut backups = self.load().await?;
        backups.insert(0, entry);
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        backups.truncate(LEDGER_CAPACITY);

        let json = serde_json::to_string_pretty(&LedgerDocument { backups })
            .map_err(|e| EnvCloneError::serialization("Failed to serialize backup ledger", e))?;

        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await.map_err(|e| {
            EnvCloneError::io(format!("Failed to write {}", staging.display()), e)
        })?;
        tokio::fs::rename(&staging, &self.path).await.map_err(|e| {
            EnvCloneError::io(format!("Failed to replace {}", self.path.display()), e)
        })?;
        Ok(())
    }
}
