//! Core library of envclone, a guarded cross-environment datastore cloner.
//!
//! This crate provides everything the `envclone` binary composes into its
//! secure clone workflow: environment loading and validation, the security
//! gate, point-in-time backups, the adaptive clone engines, row-count
//! verification and the audit report.
//!
//! # Safety Guarantees
//! - Environments are loaded from files into values; the process
//!   environment is never read for credentials or modified
//! - Data never flows from a non-production environment into production
//! - A production target is never written without double confirmation and
//!   a successful backup
//! - Keys are held in zeroizing containers and never logged
//!
//! # Architecture
//! - Trait objects for datastore access (`store::DataStore`) and operator
//!   prompts (`security::Prompt`)
//! - Factory dispatch on the environment URL scheme (`store::create_store`)
//! - Per-table failures folded into results; only configuration,
//!   validation and I/O failures propagate as errors

pub mod audit;
pub mod backup;
pub mod clone;
pub mod config;
pub mod environment;
pub mod error;
pub mod logging;
pub mod models;
pub mod security;
pub mod store;
pub mod verify;

// Re-export commonly used types
pub use audit::AuditReport;
pub use backup::{Backup, BackupManager, BackupResult, RestoreResult};
pub use clone::{CloneEngine, CloneStrategy, SuperCloneEngine};
pub use config::{CloneOptions, ConnectionSettings, EnvironmentConfig, TableCatalog};
pub use environment::{Environment, EnvironmentLoader, EnvironmentValidator, ValidationError};
pub use error::{EnvCloneError, Result, StoreError};
pub use models::{CloneResult, EnvironmentClass, Record, TableResult, TableStatus};
pub use security::{SecurityLevel, SecurityManager};
pub use store::{DataStore, StoreKind};
pub use verify::{VerificationReport, verify_counts};
