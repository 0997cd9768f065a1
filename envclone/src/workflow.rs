//! The guarded clone workflow: validate, confirm, back up, clone, verify,
//! audit.
//!
//! Validation, security and backup failures abort the run with an error
//! before the target is touched. Operator cancellation is a normal outcome.
//! Per-table failures never abort; they are carried in the clone result and
//! the audit report.

use crate::report::{render_clone_report, render_verification};
use chrono::Utc;
use envclone_core::{
    AuditReport, BackupManager, CloneOptions, CloneStrategy, EnvironmentValidator, Result,
    SecurityLevel, SecurityManager, SuperCloneEngine, TableCatalog, TableStatus,
    error::EnvCloneError,
    security::{CLONE_KEYWORD, ConfirmationOptions},
    verify_counts,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// What the operator asked for.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub source: String,
    pub target: String,
    pub options: CloneOptions,
    /// Back up the target even if policy does not require it
    pub force_backup: bool,
}

/// How a workflow run ended.
#[derive(Debug)]
pub enum WorkflowOutcome {
    /// The operator declined; nothing was written.
    Cancelled,
    /// The clone ran and the audit report was persisted.
    Completed {
        report: AuditReport,
        audit_path: PathBuf,
    },
}

/// Composes validator, security gate, backups and the super clone engine.
#[derive(Debug)]
pub struct SecureCloneWorkflow {
    validator: EnvironmentValidator,
    security: SecurityManager,
    backups: BackupManager,
    engine: SuperCloneEngine,
    audit_dir: PathBuf,
}

impl SecureCloneWorkflow {
    /// Creates a workflow writing audit reports into `audit_dir`.
    pub fn new(
        validator: EnvironmentValidator,
        security: SecurityManager,
        backups: BackupManager,
        catalog: TableCatalog,
        audit_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            validator,
            security,
            backups,
            engine: SuperCloneEngine::new(catalog),
            audit_dir: audit_dir.into(),
        }
    }

    /// Runs the workflow end to end.
    ///
    /// # Errors
    /// Returns an error if validation fails, the options are invalid, the
    /// operator input cannot be read, a required backup cannot be created
    /// or the audit report cannot be written.
    pub async fn run(&self, request: &CloneRequest) -> Result<WorkflowOutcome> {
        request.options.validate()?;
        let operation_id = SecurityManager::generate_operation_id();
        let started_at = Utc::now();
        info!("Operation {}: {} -> {}", operation_id, request.source, request.target);

        // Step 1: environments
        let report = self
            .validator
            .validate_environments(&request.source, &request.target)
            .await;
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        let validated = report.into_validated().inspect_err(|e| {
            error!("{}", e);
        })?;
        let (source, target) = (validated.source, validated.target);
        println!("{}", EnvironmentValidator::summary(&source, &target));

        // Step 2: policy
        let operation = format!("clone {} -> {}", source.name, target.name);
        let policy = self.security.validate_production_access(&operation, &target.name);
        let level = if target.is_protected {
            SecurityLevel::Critical
        } else {
            SecurityLevel::Standard
        };
        info!("Security level: {} ({})", level, policy.message);

        // Step 3: confirmation; a dry run never writes and is not gated
        let confirmed = if request.options.dry_run {
            info!("Dry run: confirmation and backup skipped");
            false
        } else {
            let confirmation = ConfirmationOptions {
                operation: operation.clone(),
                environment: target.name.clone(),
                consequences: vec![
                    format!("Current {} data will be DELETED", target.name.to_uppercase()),
                    format!(
                        "{} data will be copied to {}",
                        source.name.to_uppercase(),
                        target.name.to_uppercase()
                    ),
                    "This operation is IRREVERSIBLE".to_string(),
                    "A full audit report will be written".to_string(),
                ],
                keyword: CLONE_KEYWORD.to_string(),
            };
            if !self.security.request_double_confirmation(&confirmation).await? {
                println!("Operation cancelled by the operator, nothing was modified");
                return Ok(WorkflowOutcome::Cancelled);
            }
            true
        };

        let (mut tables, unlisted) = self
            .engine
            .catalog()
            .order_tables(&request.options.resolve_tables(self.engine.catalog()));
        tables.extend(unlisted);

        // Step 4: safety net
        let needs_backup = policy.requires_backup || target.is_protected || request.force_backup;
        let backup_id = if needs_backup && !request.options.dry_run {
            let label = format!("clone_{}_to_{}", source.name, target.name);
            let backup = self
                .backups
                .create_backup(&target, &tables, &label)
                .await
                .map_err(|e| {
                    error!("Backup failed, clone aborted: {}", e);
                    EnvCloneError::backup(format!(
                        "required backup of {} failed: {}",
                        target.name, e
                    ))
                })?;
            println!("Backup created: {}", backup.backup_id);
            Some(backup.backup_id)
        } else {
            None
        };

        // Step 5: clone
        let options = request.options.clone().with_include_tables(tables);
        let result = self.engine.execute_clone(&source, &target, &options).await?;
        println!("{}", render_clone_report(&result));
        if let Some(id) = &backup_id {
            println!("Backup available: {}", id);
        }

        // Step 6: row counts
        let verification = if result.dry_run {
            None
        } else {
            let cloned: Vec<String> = result
                .results
                .iter()
                .filter(|(_, table)| table.status != TableStatus::Skipped)
                .map(|(name, _)| name.clone())
                .collect();
            let verification = verify_counts(&source, &target, &cloned).await;
            println!("{}", render_verification(&source.name, &target.name, &verification));
            Some(verification)
        };

        // Step 7: audit
        let report = AuditReport::new(
            operation_id,
            &source.name,
            &target.name,
            level,
            confirmed,
            backup_id,
            &result,
        )
        .with_started_at(started_at);
        let report = match verification {
            Some(verification) => report.with_verification(verification),
            None => report,
        };
        let audit_path = report.write_to(&self.audit_dir).await?;
        println!("Audit report: {}", audit_path.display());

        Ok(WorkflowOutcome::Completed { report, audit_path })
    }
}
