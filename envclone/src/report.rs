//! Console reports printed at the end of each command.

use envclone_core::{
    Backup, BackupResult, CloneResult, RestoreResult, TableStatus, VerificationReport,
    verify::CountStatus,
};

/// Renders the final clone report: per-status table counts, records cloned,
/// adaptations per table and every table error.
pub fn render_clone_report(result: &CloneResult) -> String {
    let count = |status| result.tables_with_status(status).len();
    let mut lines = vec![
        if result.dry_run {
            "CLONE REPORT (dry run, target untouched)".to_string()
        } else {
            "CLONE REPORT".to_string()
        },
        "-".repeat(50),
        format!(
            "Records {}: {}",
            if result.dry_run { "that would be cloned" } else { "cloned" },
            result.total_records
        ),
        format!("Tables succeeded: {}", count(TableStatus::Success)),
        format!("Tables with errors: {}", count(TableStatus::Error)),
        format!("Tables empty: {}", count(TableStatus::Empty)),
        format!("Tables skipped: {}", count(TableStatus::Skipped)),
        format!("Adaptations applied: {}", result.adaptation_count()),
    ];

    let adapted: Vec<_> = result
        .results
        .iter()
        .filter(|(_, table)| !table.adaptations.is_empty())
        .collect();
    if !adapted.is_empty() {
        lines.push(String::new());
        lines.push("Schema adaptations:".to_string());
        for (name, table) in adapted {
            lines.push(format!("   {} ({}/{}):", name, table.target_records, table.source_records));
            for note in &table.adaptations {
                lines.push(format!("      • {}", note));
            }
        }
    }

    if !result.errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for error in &result.errors {
            lines.push(format!("   • {}", error));
        }
    }
    if !result.warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        for warning in &result.warnings {
            lines.push(format!("   • {}", warning));
        }
    }
    lines.join("\n")
}

/// Per-table source/target row counts and a verdict.
pub fn render_verification(source: &str, target: &str, report: &VerificationReport) -> String {
    let mut lines = vec![
        format!("ROW COUNTS {} -> {}", source.to_uppercase(), target.to_uppercase()),
        "-".repeat(50),
    ];
    for table in &report.tables {
        let count = |value: Option<u64>| value.map_or_else(|| "?".to_string(), |v| v.to_string());
        lines.push(match table.status {
            CountStatus::Match => format!("   ✓ {}: {}", table.table, count(table.target_count)),
            CountStatus::Different => format!(
                "   ! {}: source={} target={} ({:+})",
                table.table,
                count(table.source_count),
                count(table.target_count),
                table.difference.unwrap_or_default()
            ),
            CountStatus::Error => format!(
                "   x {}: {}",
                table.table,
                table.error.as_deref().unwrap_or("count failed")
            ),
        });
    }

    let different = report.with_status(CountStatus::Different).count();
    let failed = report.with_status(CountStatus::Error).count();
    lines.push(String::new());
    lines.push(if report.is_consistent() {
        format!("All {} tables match", report.tables.len())
    } else {
        format!(
            "{} tables differ ({} records), {} could not be counted",
            different,
            report.total_difference(),
            failed
        )
    });
    lines.join("\n")
}

/// One-paragraph summary of a created backup.
pub fn render_backup_result(result: &BackupResult) -> String {
    let mut lines = vec![
        format!("Backup created: {}", result.backup_id),
        format!("   File: {}", result.file_path.display()),
        format!("   Tables: {}", result.tables_backed_up.join(", ")),
        format!("   Records: {}", result.record_count),
    ];
    if !result.skipped_tables.is_empty() {
        lines.push(format!("   Skipped (unreadable): {}", result.skipped_tables.join(", ")));
    }
    lines.join("\n")
}

/// Summary of a restore run.
pub fn render_restore_result(backup_id: &str, result: &RestoreResult) -> String {
    let mut lines = vec![
        format!("Restored backup {}", backup_id),
        format!("   Records restored: {}", result.records_restored),
        format!("   Tables restored: {}", result.restored_tables.len()),
    ];
    if !result.failed_tables.is_empty() {
        lines.push(format!("   Tables failed: {}", result.failed_tables.join(", ")));
    }
    lines.join("\n")
}

/// Ledger listing, one backup per line.
pub fn render_backup_list(backups: &[Backup]) -> String {
    if backups.is_empty() {
        return "No backups recorded".to_string();
    }
    backups
        .iter()
        .map(|backup| {
            format!(
                "{}  {}  {:<12} {:>8} records  {}",
                backup.timestamp.format("%Y-%m-%d %H:%M:%S"),
                backup.environment,
                backup.operation,
                backup.record_count,
                backup.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
