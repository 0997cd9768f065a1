//! Configuration types for environments, stores and clone runs.
//!
//! This module contains every configuration structure the toolkit reads:
//! - `EnvironmentConfig`: per-environment URL and keys, read from its own file
//! - `ConnectionSettings`: timeouts and pool limits for datastore clients
//! - `TableCatalog`: dependency order, default table set and known columns
//! - `CloneOptions`: per-run clone switches
//!
//! # Security
//! Environment files are read into values passed by parameter. The process
//! environment is never read for credentials and never modified.

mod catalog;
mod connection;
mod environment;
mod options;

pub use catalog::{DependencyGroup, TableCatalog, TableSpec};
pub use connection::ConnectionSettings;
pub use environment::{EnvironmentConfig, candidate_config_files, resolve_config_file};
pub use options::{CloneOptions, parse_table_list};
