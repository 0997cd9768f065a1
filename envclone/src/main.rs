//! Guarded cross-environment datastore clone tool.
//!
//! # Safety Guarantees
//! - Production is never a clone target from a non-production source
//! - Every write is double-confirmed by the operator
//! - Protected targets are backed up before they are wiped
//! - Credentials are never logged

use clap::Parser;
use envclone::{Cli, Context, execute};
use envclone_core::{logging::init_logging, security::TerminalPrompt};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let context = Context {
        prompt: Arc::new(TerminalPrompt::new()),
        connector: None,
    };

    match execute(&cli.command, &cli.global, &context).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!("{}", e);
            eprintln!("Operation aborted: {}", e);
            eprintln!("Check the log output above for details.");
            eprintln!(
                "No automatic rollback is performed; backups (if any) are in {} and can be restored with `envclone restore`.",
                cli.global.backup_dir.display()
            );
            ExitCode::FAILURE
        }
    }
}
