//! Command handlers. Each returns the process exit code.

use crate::cli::{
    BackupArgs, CloneArgs, Command, EnvironmentArgs, GlobalArgs, ListArgs, PairArgs, RestoreArgs,
    VerifyArgs,
};
use crate::report::{render_backup_list, render_backup_result, render_restore_result, render_verification};
use crate::workflow::{CloneRequest, SecureCloneWorkflow, WorkflowOutcome};
use envclone_core::{
    BackupManager, EnvironmentLoader, EnvironmentValidator, Result, SecurityManager, TableCatalog,
    config::parse_table_list,
    verify_counts,
    error::EnvCloneError,
    security::{ConfirmationOptions, Prompt, RESTORE_KEYWORD},
    store::Connector,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Runtime collaborators handed to every command.
#[derive(Clone)]
pub struct Context {
    pub prompt: Arc<dyn Prompt>,
    /// Replaces the URL-scheme connector when set
    pub connector: Option<Arc<dyn Connector>>,
}

impl Context {
    fn loader(&self, global: &GlobalArgs) -> EnvironmentLoader {
        let loader = EnvironmentLoader::new(&global.config_dir);
        match &self.connector {
            Some(connector) => loader.with_connector(connector.clone()),
            None => loader,
        }
    }

    fn security(&self) -> SecurityManager {
        SecurityManager::new(self.prompt.clone())
    }
}

fn load_catalog(path: Option<&Path>) -> Result<TableCatalog> {
    match path {
        Some(path) => {
            let catalog = TableCatalog::from_path(path)?;
            info!("Using table catalog {}", path.display());
            Ok(catalog)
        }
        None => TableCatalog::builtin(),
    }
}

/// Dispatches a parsed command.
///
/// # Errors
/// Returns configuration, validation, security, backup and I/O failures.
/// Per-table clone failures are reported, not returned.
pub async fn execute(command: &Command, global: &GlobalArgs, context: &Context) -> Result<i32> {
    match command {
        Command::Clone(args) => clone(args, global, context).await,
        Command::Validate(args) => validate(args, global, context).await,
        Command::Verify(args) => verify(args, global, context).await,
        Command::Test(args) => test_connection(args, global, context).await,
        Command::Backup(args) => backup(args, global, context).await,
        Command::Restore(args) => restore(args, global, context).await,
        Command::Backups(args) => list_backups(args, global).await,
    }
}

async fn clone(args: &CloneArgs, global: &GlobalArgs, context: &Context) -> Result<i32> {
    let catalog = load_catalog(args.catalog.as_deref())?;
    let workflow = SecureCloneWorkflow::new(
        EnvironmentValidator::new(context.loader(global)),
        context.security(),
        BackupManager::new(&global.backup_dir, catalog.clone()),
        catalog,
        &args.audit_dir,
    );
    let request = CloneRequest {
        source: args.pair.source.clone(),
        target: args.pair.target.clone(),
        options: args.clone_options(),
        force_backup: args.backup,
    };

    let outcome = workflow.run(&request).await?;
    if let WorkflowOutcome::Completed { report, .. } = &outcome {
        info!(
            "✓ Clone {} finished: {} records across {} tables",
            report.operation_id, report.total_records, report.tables_processed
        );
    }
    Ok(0)
}

async fn validate(args: &PairArgs, global: &GlobalArgs, context: &Context) -> Result<i32> {
    let report = EnvironmentValidator::new(context.loader(global))
        .validate_environments(&args.source, &args.target)
        .await;

    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    if !report.is_valid() {
        println!("Validation failed:");
        for error in &report.errors {
            println!("   • {}", error);
        }
        return Ok(1);
    }

    let validated = report.into_validated()?;
    println!("{}", EnvironmentValidator::summary(&validated.source, &validated.target));
    println!("Environments validated: {} -> {}", args.source, args.target);
    Ok(0)
}

async fn verify(args: &VerifyArgs, global: &GlobalArgs, context: &Context) -> Result<i32> {
    let catalog = load_catalog(args.catalog.as_deref())?;
    let requested = match &args.tables {
        Some(csv) => parse_table_list(csv),
        None => catalog.default_tables.clone(),
    };
    if requested.is_empty() {
        return Err(EnvCloneError::configuration("No tables to verify"));
    }
    let (mut tables, unlisted) = catalog.order_tables(&requested);
    tables.extend(unlisted);

    let loader = context.loader(global);
    let source = loader.load_environment(&args.pair.source).await?;
    let target = loader.load_environment(&args.pair.target).await?;

    let report = verify_counts(&source, &target, &tables).await;
    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| EnvCloneError::serialization("Failed to serialize verification", e))?;
        println!("{}", json);
    } else {
        println!("{}", render_verification(&source.name, &target.name, &report));
    }
    Ok(if report.is_consistent() { 0 } else { 1 })
}

async fn test_connection(args: &EnvironmentArgs, global: &GlobalArgs, context: &Context) -> Result<i32> {
    let loader = context.loader(global);
    let environment = loader.load_environment(&args.environment).await?;

    match loader.probe(&environment).await {
        Ok(()) => {
            info!("✓ Connection test successful");
            println!(
                "Connection to {} ({} backend) successful",
                environment.name,
                environment.client.kind()
            );
            Ok(0)
        }
        Err(e) => {
            error!("Connection test failed: {}", e);
            println!("Cannot connect to {}: {}", environment.name, e.message);
            Ok(1)
        }
    }
}

async fn backup(args: &BackupArgs, global: &GlobalArgs, context: &Context) -> Result<i32> {
    let catalog = load_catalog(args.catalog.as_deref())?;
    let tables = match &args.tables {
        Some(csv) => parse_table_list(csv),
        None => catalog.default_tables.clone(),
    };
    if tables.is_empty() {
        return Err(EnvCloneError::configuration("No tables to back up"));
    }

    let environment = context.loader(global).load_environment(&args.target.environment).await?;
    let manager = BackupManager::new(&global.backup_dir, catalog);
    let result = manager.create_backup(&environment, &tables, &args.operation).await?;
    println!("{}", render_backup_result(&result));
    Ok(0)
}

async fn restore(args: &RestoreArgs, global: &GlobalArgs, context: &Context) -> Result<i32> {
    let manager = BackupManager::new(&global.backup_dir, TableCatalog::builtin()?);
    let document = manager.load_backup(&args.backup_id).await?;
    let environment = context.loader(global).load_environment(&args.environment).await?;

    let confirmation = ConfirmationOptions {
        operation: format!("restore backup {}", args.backup_id),
        environment: environment.name.clone(),
        consequences: vec![
            format!(
                "Current data of {} table(s) in {} will be DELETED",
                document.data.len(),
                environment.name.to_uppercase()
            ),
            format!(
                "Rows captured from {} at {} will be inserted",
                document.metadata.environment,
                document.metadata.timestamp.to_rfc3339()
            ),
            "This operation is IRREVERSIBLE".to_string(),
        ],
        keyword: RESTORE_KEYWORD.to_string(),
    };
    if !context.security().request_double_confirmation(&confirmation).await? {
        println!("Restore cancelled by the operator, nothing was modified");
        return Ok(0);
    }

    let result = manager.restore_backup(&args.backup_id, &environment).await?;
    println!("{}", render_restore_result(&args.backup_id, &result));
    Ok(if result.failed_tables.is_empty() { 0 } else { 1 })
}

async fn list_backups(args: &ListArgs, global: &GlobalArgs) -> Result<i32> {
    let manager = BackupManager::new(&global.backup_dir, TableCatalog::builtin()?);
    let backups = manager.list_backups().await?;
    if args.json {
        let json = serde_json::to_string_pretty(&backups)
            .map_err(|e| EnvCloneError::serialization("Failed to serialize backup ledger", e))?;
        println!("{}", json);
    } else {
        println!("{}", render_backup_list(&backups));
    }
    Ok(0)
}
