//! Audit report of one orchestrated clone run.
//!
//! Every decision point of the secure workflow lands in a single JSON
//! document named after the operation id (`audit-<operation id>.json`).

use crate::error::EnvCloneError;
use crate::models::{CloneResult, TableResult};
use crate::security::SecurityLevel;
use crate::verify::VerificationReport;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Decision trail of one clone run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub operation_id: String,
    /// When the operation id was issued
    pub started_at: DateTime<Utc>,
    /// When the report was assembled
    pub completed_at: DateTime<Utc>,
    pub operation: String,
    pub source: String,
    pub target: String,
    pub confirmed: bool,
    pub backup_id: Option<String>,
    pub security_level: SecurityLevel,
    pub dry_run: bool,
    pub total_records: u64,
    pub tables_processed: u64,
    pub results: IndexMap<String, TableResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Post-clone row counts; absent for dry runs
    pub verification: Option<VerificationReport>,
}

impl AuditReport {
    /// Assembles the report from a finished clone. Both timestamps are set
    /// to now; see [`AuditReport::with_started_at`].
    pub fn new(
        operation_id: impl Into<String>,
        source: &str,
        target: &str,
        security_level: SecurityLevel,
        confirmed: bool,
        backup_id: Option<String>,
        clone: &CloneResult,
    ) -> Self {
        let now = Utc::now();
        Self {
            operation_id: operation_id.into(),
            started_at: now,
            completed_at: now,
            operation: format!("clone_{}_to_{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
            confirmed,
            backup_id,
            security_level,
            dry_run: clone.dry_run,
            total_records: clone.total_records,
            tables_processed: clone.tables_processed,
            results: clone.results.clone(),
            errors: clone.errors.clone(),
            warnings: clone.warnings.clone(),
            verification: None,
        }
    }

    /// Sets the time the operation started.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Attaches the post-clone count comparison.
    pub fn with_verification(mut self, verification: VerificationReport) -> Self {
        self.verification = Some(verification);
        self
    }

    /// File name the report is stored under.
    pub fn file_name(&self) -> String {
        format!("audit-{}.json", self.operation_id)
    }

    /// Writes the report into `directory`, creating it if needed.
    ///
    /// # Errors
    /// Returns an I/O or serialization error if the file cannot be written.
    pub async fn write_to(&self, directory: &Path) -> crate::Result<PathBuf> {
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            EnvCloneError::io(
                format!("Failed to create audit directory {}", directory.display()),
                e,
            )
        })?;

        let path = directory.join(self.file_name());
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EnvCloneError::serialization("Failed to serialize audit report", e))?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            EnvCloneError::io(format!("Failed to write audit report {}", path.display()), e)
        })?;

        info!("✓ Audit report written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::TableCount;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_report_is_written_under_operation_id() {
        let dir = tempdir().unwrap();
        let mut clone = CloneResult::new(false);
        clone.record(
            "zone_areas",
            TableResult {
                source_records: 3,
                target_records: 3,
                ..TableResult::default()
            },
        );

        let started_at = Utc::now()
            .checked_sub_signed(chrono::Duration::seconds(30))
            .unwrap();
        let report = AuditReport::new(
            "op_1_abc",
            "prod",
            "test",
            SecurityLevel::Standard,
            true,
            Some("backup_test_x".to_string()),
            &clone,
        )
        .with_started_at(started_at)
        .with_verification(VerificationReport {
            tables: vec![TableCount::new("zone_areas", 3, 3)],
        });
        assert!(report.completed_at > report.started_at);
        let path = report.write_to(&dir.path().join("audit")).await.unwrap();

        assert!(path.ends_with("audit-op_1_abc.json"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["operationId"], "op_1_abc");
        assert_eq!(json["operation"], "clone_prod_to_test");
        assert_eq!(json["backupId"], "backup_test_x");
        assert_eq!(json["securityLevel"], "STANDARD");
        assert_eq!(json["totalRecords"], 3);
        assert_eq!(json["results"]["zone_areas"]["targetRecords"], 3);
        assert_eq!(json["startedAt"], json!(started_at));
        assert!(json["completedAt"].is_string());
        assert!(json.get("timestamp").is_none());
        assert_eq!(json["verification"]["tables"][0]["difference"], 0);
    }

    #[test]
    fn test_report_without_verification() {
        let report = AuditReport::new(
            "op_2_def",
            "prod",
            "test",
            SecurityLevel::Standard,
            false,
            None,
            &CloneResult::new(true),
        );
        assert_eq!(report.started_at, report.completed_at);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["verification"].is_null());
    }
}
