//! Dependency-ordered clone with a repair pass.

use super::adapt::project;
use super::anonymize::Anonymizer;
use super::engine::CloneEngine;
use super::fixers::fix_records;
use super::schema::discover_target_schema;
use super::{CloneStrategy, now_timestamp};
use crate::config::{CloneOptions, TableCatalog};
use crate::environment::Environment;
use crate::models::{CloneResult, TableResult, TableStatus};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Reason recorded for requested tables the dependency order does not list.
const UNLISTED_REASON: &str = "not in the dependency order";

/// [`CloneEngine`] run in catalog dependency order, followed by a repair
/// pass for tables whose main pass stored nothing.
///
/// Parents are always inserted before children. Requested tables the
/// catalog does not order are reported as skipped rather than attempted.
#[derive(Debug, Clone)]
pub struct SuperCloneEngine {
    base: CloneEngine,
}

impl SuperCloneEngine {
    /// Creates an engine using `catalog` for ordering and defaults.
    pub fn new(catalog: TableCatalog) -> Self {
        Self {
            base: CloneEngine::new(catalog),
        }
    }

    /// Catalog driving ordering, essentials and wipe keys.
    pub fn catalog(&self) -> &TableCatalog {
        self.base.catalog()
    }

    /// Re-reads `table`, repairs every row and inserts rows one at a time,
    /// falling back to essential columns. Returns the rows stored.
    pub async fn repair_table(
        &self,
        source: &Environment,
        target: &Environment,
        table: &str,
        anonymizer: Option<&Anonymizer>,
    ) -> u64 {
        let rows = match source.client.select_all(table, self.catalog().key_column(table)).await {
            Ok(rows) => rows,
            Err(error) => {
                warn!("Repair of {} skipped: {}", table, error);
                return 0;
            }
        };
        let rows = match anonymizer {
            Some(anonymizer) => anonymizer.anonymize_table(table, rows).rows,
            None => rows,
        };
        if rows.is_empty() {
            return 0;
        }

        let now = now_timestamp();
        let key = self.catalog().key_column(table);
        let fixed = fix_records(target.client.as_ref(), table, key, &rows, &now).await;
        let schema = discover_target_schema(target.client.as_ref(), table, self.catalog())
            .await
            .ok();

        let mut inserted = 0u64;
        for record in fixed {
            let record = match &schema {
                Some(schema) => project(record, schema),
                None => record,
            };
            match target.client.insert(table, std::slice::from_ref(&record)).await {
                Ok(()) => inserted = inserted.saturating_add(1),
                Err(error) => {
                    debug!("Repaired row rejected by {}: {}", table, error);
                    if self
                        .base
                        .insert_essential(target.client.as_ref(), table, &record, schema.as_ref())
                        .await
                    {
                        inserted = inserted.saturating_add(1);
                    }
                }
            }
        }
        inserted
    }
}

#[async_trait]
impl CloneStrategy for SuperCloneEngine {
    async fn execute_clone(
        &self,
        source: &Environment,
        target: &Environment,
        options: &CloneOptions,
    ) -> crate::Result<CloneResult> {
        options.validate()?;
        let requested = options.resolve_tables(self.catalog());
        let (ordered, unlisted) = self.catalog().order_tables(&requested);
        info!(
            "Cloning {} tables from {} to {} in dependency order{}",
            ordered.len(),
            source.name,
            target.name,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let mut result = self.base.clone_tables(source, target, &ordered, options).await;

        for table in unlisted {
            warn!("Skipping {}: {}", table, UNLISTED_REASON);
            result.warnings.push(format!("{}: skipped, {}", table, UNLISTED_REASON));
            result.record(&table, TableResult::skipped(UNLISTED_REASON));
        }

        if options.dry_run {
            return Ok(result);
        }

        let needs_repair: Vec<String> = result
            .results
            .iter()
            .filter(|(_, r)| {
                r.status == TableStatus::Success && r.target_records == 0 && r.source_records > 0
            })
            .map(|(table, _)| table.clone())
            .collect();

        let anonymizer = options
            .anonymize
            .then(|| Anonymizer::new(target.name.clone(), now_timestamp()));
        for table in needs_repair {
            info!("Repairing {}: main pass stored no records", table);
            let recovered = self
                .repair_table(source, target, &table, anonymizer.as_ref())
                .await;
            if recovered > 0 {
                if let Some(table_result) = result.results.get_mut(&table) {
                    table_result.note(format!("Post-processing recovered {} records", recovered));
                }
                result.add_recovered(&table, recovered);
                info!("✓ {}: recovered {} records", table, recovered);
            }
        }

        Ok(result)
    }
}
