//! Command line definition.

use clap::{Args, Parser, Subcommand};
use envclone_core::config::{CloneOptions, parse_table_list};
use std::path::PathBuf;

/// Guarded cross-environment clone tool.
#[derive(Debug, Parser)]
#[command(name = "envclone")]
#[command(about = "Clone, back up and restore datastore environments")]
#[command(version)]
#[command(long_about = "
envclone - guarded cross-environment datastore cloning

Copies table data between isolated environments (production, test,
development) in dependency order, adapting rows to the target schema.

SAFETY FEATURES:
- Never clones into production from a non-production source
- Double confirmation before any write
- Protected targets are backed up before they are wiped
- Every clone run leaves a JSON audit report

ENVIRONMENT FILES:
  prod        .env.prod (or .env.production)
  test        .env.test
  dev         .env.development
  <name>      .env.<name>

EXAMPLES:
  envclone validate prod test
  envclone clone prod test --dry-run
  envclone clone prod dev --anonymize --exclude settings
  envclone verify prod test --tables lofts,tasks
  envclone restore backup_test_clone_prod_to_test_2024-05-01T10-00-00-000Z test
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all log output except errors")]
    pub quiet: bool,

    /// Directory holding the `.env.<name>` files
    #[arg(long, global = true, env = "ENVCLONE_CONFIG_DIR", default_value = ".")]
    pub config_dir: PathBuf,

    /// Directory holding backup files and the ledger
    #[arg(long, global = true, env = "ENVCLONE_BACKUP_DIR", default_value = "backups")]
    pub backup_dir: PathBuf,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate, confirm, back up and clone one environment into another
    Clone(CloneArgs),
    /// Check that a clone between two environments would be allowed
    Validate(PairArgs),
    /// Compare per-table row counts of two environments
    Verify(VerifyArgs),
    /// Test connectivity to one environment
    Test(EnvironmentArgs),
    /// Snapshot tables of an environment to a backup file
    Backup(BackupArgs),
    /// Restore a backup into an environment
    Restore(RestoreArgs),
    /// List recorded backups, newest first
    Backups(ListArgs),
}

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Environment to read from
    pub source: String,
    /// Environment to write to
    pub target: String,
}

#[derive(Debug, Args)]
pub struct EnvironmentArgs {
    /// Environment name
    pub environment: String,
}

#[derive(Debug, Args)]
pub struct CloneArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Read and adapt without touching the target
    #[arg(long)]
    pub dry_run: bool,

    /// Scrub sensitive fields before inserting
    #[arg(long)]
    pub anonymize: bool,

    /// Comma-separated tables to clone instead of the default set
    #[arg(long, value_name = "CSV")]
    pub include: Option<String>,

    /// Comma-separated tables to leave out
    #[arg(long, value_name = "CSV")]
    pub exclude: Option<String>,

    /// Records per insert batch
    #[arg(long, default_value = "50")]
    pub batch_size: usize,

    /// Insert source rows as-is instead of projecting them onto the target schema
    #[arg(long)]
    pub no_adapt: bool,

    /// Back up the target even when policy does not require it
    #[arg(long)]
    pub backup: bool,

    /// Table catalog file replacing the built-in one
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Directory the audit report is written to
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub audit_dir: PathBuf,
}

impl CloneArgs {
    /// Clone options described by the flags.
    pub fn clone_options(&self) -> CloneOptions {
        let mut options = CloneOptions::new()
            .with_dry_run(self.dry_run)
            .with_anonymize(self.anonymize)
            .with_batch_size(self.batch_size)
            .with_adapt_schema(!self.no_adapt);
        if let Some(include) = &self.include {
            options = options.with_include_tables(parse_table_list(include));
        }
        if let Some(exclude) = &self.exclude {
            options = options.with_exclude_tables(parse_table_list(exclude));
        }
        options
    }
}

#[derive(Debug, Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Comma-separated tables; the default clone set when omitted
    #[arg(long, value_name = "CSV")]
    pub tables: Option<String>,

    /// Table catalog file replacing the built-in one
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Print the comparison as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(flatten)]
    pub target: EnvironmentArgs,

    /// Comma-separated tables; the default clone set when omitted
    #[arg(long, value_name = "CSV")]
    pub tables: Option<String>,

    /// Label recorded with the backup
    #[arg(long, default_value = "manual")]
    pub operation: String,

    /// Table catalog file replacing the built-in one
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Id of the backup to restore
    pub backup_id: String,
    /// Environment to restore into
    pub environment: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print the ledger as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_clone_flags_map_to_options() {
        let cli = Cli::parse_from([
            "envclone",
            "clone",
            "prod",
            "test",
            "--dry-run",
            "--anonymize",
            "--include",
            "zone_areas, lofts",
            "--exclude",
            "lofts",
            "--batch-size",
            "10",
            "--no-adapt",
        ]);
        let Command::Clone(args) = cli.command else {
            unreachable!("expected clone command");
        };
        assert_eq!(args.pair.source, "prod");
        assert_eq!(args.pair.target, "test");

        let options = args.clone_options();
        assert!(options.dry_run);
        assert!(options.anonymize);
        assert!(!options.adapt_schema);
        assert_eq!(options.batch_size, 10);
        assert_eq!(
            options.include_tables,
            Some(vec!["zone_areas".to_string(), "lofts".to_string()])
        );
        assert_eq!(options.exclude_tables, vec!["lofts".to_string()]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["envclone", "backups", "-vv", "--config-dir", "/etc/envclone"]);
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.config_dir, PathBuf::from("/etc/envclone"));
        assert!(matches!(cli.command, Command::Backups(ListArgs { json: false })));
    }

    #[test]
    fn test_verify_arguments() {
        let cli = Cli::parse_from([
            "envclone", "verify", "prod", "test", "--tables", "lofts,tasks", "--json",
        ]);
        let Command::Verify(args) = cli.command else {
            unreachable!("expected verify command");
        };
        assert_eq!(args.pair.source, "prod");
        assert_eq!(args.pair.target, "test");
        assert_eq!(args.tables.as_deref(), Some("lofts,tasks"));
        assert!(args.json);
    }

    #[test]
    fn test_clone_requires_both_environments() {
        assert!(Cli::try_parse_from(["envclone", "clone", "prod"]).is_err());
    }
}
