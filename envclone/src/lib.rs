//! Library side of the `envclone` binary.
//!
//! Exposes the CLI definition, command handlers, the guarded clone
//! workflow and console reports so they can be driven from tests with a
//! scripted prompt and in-memory stores.

pub mod cli;
pub mod commands;
pub mod report;
pub mod workflow;

pub use cli::{Cli, Command, GlobalArgs};
pub use commands::{Context, execute};
pub use workflow::{CloneRequest, SecureCloneWorkflow, WorkflowOutcome};
