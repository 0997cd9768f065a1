//! Cross-environment table cloning.
//!
//! # Pipeline
//! 1. Resolve the table list from the options and catalog
//! 2. Per table: read source, anonymize, discover target schema, adapt
//! 3. Wipe the target table and insert with batch, row and essential tiers
//! 4. ([`SuperCloneEngine`] only) reorder by dependencies and repair tables
//!    whose main pass stored nothing
//!
//! Both engines implement [`CloneStrategy`] so callers can pick one at run
//! time.

mod adapt;
mod anonymize;
mod engine;
mod fixers;
mod schema;
mod super_engine;

pub use adapt::{Adaptation, TIMESTAMP_COLUMNS, adapt_records, essential_record, project};
pub use anonymize::{ANONYMIZED_MESSAGE, AnonymizedRows, Anonymizer};
pub use engine::CloneEngine;
pub use fixers::{REFERENCE_SAMPLE_SIZE, fix_records};
pub use schema::{SchemaSource, TableSchema, discover_target_schema};
pub use super_engine::SuperCloneEngine;

use crate::config::CloneOptions;
use crate::environment::Environment;
use crate::models::CloneResult;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

/// A way of copying tables from one environment to another.
///
/// # Object Safety
/// This trait is object-safe and can be used as `Box<dyn CloneStrategy>`.
#[async_trait]
pub trait CloneStrategy: Send + Sync {
    /// Clones the tables selected by `options` from `source` into `target`.
    ///
    /// Per-table failures are reported in the result, not returned.
    ///
    /// # Errors
    /// Returns a configuration error if `options` are invalid.
    async fn execute_clone(
        &self,
        source: &Environment,
        target: &Environment,
        options: &CloneOptions,
    ) -> crate::Result<CloneResult>;
}

/// Current time in the ISO-8601 form written into defaulted columns.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
