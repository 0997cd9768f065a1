//! Row-count comparison between two environments.
//!
//! Used after a clone, and on its own by `envclone verify`, to confirm that
//! every table holds as many rows in the target as in the source. Only
//! counts are compared; no row content leaves either store.

use crate::environment::Environment;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of comparing one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountStatus {
    /// Both sides hold the same number of rows
    Match,
    /// The counts differ
    Different,
    /// At least one side could not be counted
    Error,
}

/// Source and target row counts of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCount {
    pub table: String,
    pub status: CountStatus,
    pub source_count: Option<u64>,
    pub target_count: Option<u64>,
    /// `target - source`; absent when either side failed
    pub difference: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableCount {
    /// Compares two successful counts.
    pub fn new(table: impl Into<String>, source_count: u64, target_count: u64) -> Self {
        let difference = i64::try_from(target_count)
            .ok()
            .zip(i64::try_from(source_count).ok())
            .and_then(|(target, source)| target.checked_sub(source));
        let status = if source_count == target_count {
            CountStatus::Match
        } else {
            CountStatus::Different
        };

        Self {
            table: table.into(),
            status,
            source_count: Some(source_count),
            target_count: Some(target_count),
            difference,
            error: None,
        }
    }

    /// A table that could not be compared.
    pub fn error(
        table: impl Into<String>,
        source_count: Option<u64>,
        target_count: Option<u64>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            status: CountStatus::Error,
            source_count,
            target_count,
            difference: None,
            error: Some(error.into()),
        }
    }
}

/// Per-table count comparison, in the order the tables were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub tables: Vec<TableCount>,
}

impl VerificationReport {
    /// True when every table matched.
    pub fn is_consistent(&self) -> bool {
        self.tables.iter().all(|t| t.status == CountStatus::Match)
    }

    /// Tables whose status is `status`.
    pub fn with_status(&self, status: CountStatus) -> impl Iterator<Item = &TableCount> {
        self.tables.iter().filter(move |t| t.status == status)
    }

    /// Sum of absolute differences over the compared tables.
    pub fn total_difference(&self) -> u64 {
        self.tables
            .iter()
            .filter_map(|t| t.difference)
            .fold(0u64, |total, d| total.saturating_add(d.unsigned_abs()))
    }
}

/// Counts every table on both sides and compares the totals.
///
/// A failed count never aborts the comparison: the table is recorded with
/// status [`CountStatus::Error`] and the remaining tables are still checked.
pub async fn verify_counts(
    source: &Environment,
    target: &Environment,
    tables: &[String],
) -> VerificationReport {
    info!(
        "Verifying row counts of {} tables: {} -> {}",
        tables.len(),
        source.name,
        target.name
    );

    let mut report = VerificationReport::default();
    for table in tables {
        let (source_count, target_count) =
            tokio::join!(source.client.count(table), target.client.count(table));

        let count = match (source_count, target_count) {
            (Ok(s), Ok(t)) => TableCount::new(table, s, t),
            (s, t) => {
                let message = [
                    s.as_ref().err().map(|e| format!("source: {}", e)),
                    t.as_ref().err().map(|e| format!("target: {}", e)),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("; ");
                TableCount::error(table, s.ok(), t.ok(), message)
            }
        };

        match count.status {
            CountStatus::Match => info!("  {}: {} rows", table, count.target_count.unwrap_or_default()),
            CountStatus::Different => warn!(
                "  {}: source={} target={}",
                table,
                count.source_count.unwrap_or_default(),
                count.target_count.unwrap_or_default()
            ),
            CountStatus::Error => warn!(
                "  {}: not compared: {}",
                table,
                count.error.as_deref().unwrap_or_default()
            ),
        }
        report.tables.push(count);
    }

    if report.is_consistent() {
        info!("✓ Row counts match on all {} tables", report.tables.len());
    }
    report
}
