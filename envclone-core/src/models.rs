//! Core data models shared by the clone engine, backups and audit reports.
//!
//! Rows are dynamic: the set of columns of a table is only known at run
//! time, per environment, so a row is a [`Record`] (ordered column name to
//! JSON scalar map) rather than a fixed struct.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One row of a table: column name to scalar value, in column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Sentinel id used by the delete-all idiom (`key <> sentinel` matches every row).
pub const WIPE_SENTINEL: &str = "00000000-0000-0000-0000-000000000000";

/// Environment classification derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentClass {
    Production,
    Test,
    Development,
}

impl EnvironmentClass {
    /// Classifies an environment name by substring, case-insensitively.
    ///
    /// Anything that matches neither `prod` nor `test` nor `dev` is
    /// treated as development.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("prod") {
            Self::Production
        } else if name.contains("test") {
            Self::Test
        } else {
            Self::Development
        }
    }

    /// Production environments are protected.
    pub fn is_protected(self) -> bool {
        self == Self::Production
    }
}

impl std::fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Test => write!(f, "test"),
            Self::Development => write!(f, "development"),
        }
    }
}

/// Outcome of cloning a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Success,
    Error,
    Empty,
    Skipped,
}

impl std::fmt::Display for TableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Empty => write!(f, "empty"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

const DROP_NOTE_SUFFIX: &str = "records dropped after all insert attempts";

/// Per-table clone result.
///
/// Invariant: `target_records <= source_records`, and whenever it is
/// strictly less, `adaptations` carries a drop note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResult {
    pub status: TableStatus,
    pub source_records: u64,
    pub target_records: u64,
    pub adaptations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for TableResult {
    fn default() -> Self {
        Self {
            status: TableStatus::Success,
            source_records: 0,
            target_records: 0,
            adaptations: Vec::new(),
            error: None,
        }
    }
}

impl TableResult {
    /// Result for a table with no source rows.
    pub fn empty() -> Self {
        Self {
            status: TableStatus::Empty,
            ..Self::default()
        }
    }

    /// Result for a table that failed before inserting anything.
    pub fn error(source_records: u64, message: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Error,
            source_records,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Result for a table that was never attempted.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Skipped,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Appends a human-readable adaptation note.
    pub fn note(&mut self, adaptation: impl Into<String>) {
        self.adaptations.push(adaptation.into());
    }

    /// Number of source records that never reached the target.
    pub fn dropped(&self) -> u64 {
        self.source_records.saturating_sub(self.target_records)
    }

    /// Replaces any stale drop note with one matching the current counts.
    pub fn reconcile_drop_note(&mut self) {
        self.adaptations.retain(|note| !note.ends_with(DROP_NOTE_SUFFIX));
        let dropped = self.dropped();
        if dropped > 0 {
            self.adaptations.push(format!("{} {}", dropped, DROP_NOTE_SUFFIX));
        }
    }
}

/// Aggregate result of one clone invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneResult {
    pub success: bool,
    pub dry_run: bool,
    pub total_records: u64,
    pub tables_processed: u64,
    pub results: IndexMap<String, TableResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CloneResult {
    /// Creates an empty result for a run.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Records the outcome of one table and updates the running totals.
    ///
    /// Skipped tables are listed but do not count as processed.
    pub fn record(&mut self, table: &str, result: TableResult) {
        self.total_records = self.total_records.saturating_add(result.target_records);
        if result.status != TableStatus::Skipped {
            self.tables_processed = self.tables_processed.saturating_add(1);
        }
        if result.status == TableStatus::Error {
            let message = result.error.as_deref().unwrap_or("unknown error");
            self.errors.push(format!("{}: {}", table, message));
        }
        self.results.insert(table.to_string(), result);
        self.success = self.errors.is_empty();
    }

    /// Adds records recovered after the main pass to a table and the total.
    pub fn add_recovered(&mut self, table: &str, recovered: u64) {
        if let Some(result) = self.results.get_mut(table) {
            result.target_records = result
                .target_records
                .saturating_add(recovered)
                .min(result.source_records);
            result.reconcile_drop_note();
        }
        self.total_records = self
            .results
            .values()
            .map(|r| r.target_records)
            .fold(0u64, u64::saturating_add);
    }

    /// Names of the tables with the given status, in processing order.
    pub fn tables_with_status(&self, status: TableStatus) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Total number of adaptation notes across all tables.
    pub fn adaptation_count(&self) -> usize {
        self.results.values().map(|r| r.adaptations.len()).sum()
    }
}
