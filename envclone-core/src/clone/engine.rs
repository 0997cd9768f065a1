//! Table-by-table clone with schema adaptation and tiered inserts.

use super::adapt::{adapt_records, essential_record};
use super::anonymize::Anonymizer;
use super::schema::{TableSchema, discover_target_schema};
use super::{CloneStrategy, now_timestamp};
use crate::config::{CloneOptions, TableCatalog};
use crate::environment::Environment;
use crate::models::{CloneResult, Record, TableResult, TableStatus, WIPE_SENTINEL};
use crate::store::DataStore;
use async_trait::async_trait;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Clones tables in the order given.
///
/// Per table: read the source in full, optionally anonymize, discover the
/// target schema, project records onto it, wipe the target, then insert.
/// Inserts fall back from batches to single rows to essential-column rows;
/// records that fail every tier are dropped and counted.
///
/// # Example
/// ```rust
/// use envclone_core::clone::{CloneEngine, CloneStrategy};
/// use envclone_core::config::{CloneOptions, EnvironmentConfig, TableCatalog};
/// use envclone_core::environment::Environment;
/// use envclone_core::store::MemoryStore;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> envclone_core::Result<()> {
/// let source = Environment::new(
///     EnvironmentConfig::new("prod", "http://prod.invalid", "service-key"),
///     Arc::new(MemoryStore::new().with_table("zone_areas", vec![json!({"id": "z1", "name": "North"})])),
/// );
/// let target = Environment::new(
///     EnvironmentConfig::new("test", "http://test.invalid", "service-key"),
///     Arc::new(MemoryStore::new().with_empty_table("zone_areas")),
/// );
///
/// let engine = CloneEngine::new(TableCatalog::builtin()?);
/// let options = CloneOptions::new().with_include_tables(vec!["zone_areas".to_string()]);
/// let result = engine.execute_clone(&source, &target, &options).await?;
/// assert_eq!(result.total_records, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CloneEngine {
    catalog: TableCatalog,
}

impl CloneEngine {
    /// Creates an engine using `catalog` for table defaults and key columns.
    pub fn new(catalog: TableCatalog) -> Self {
        Self { catalog }
    }

    /// Catalog backing this engine.
    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    /// Clones `tables` in the given order and aggregates the outcome.
    ///
    /// A failing table never stops the run.
    pub async fn clone_tables(
        &self,
        source: &Environment,
        target: &Environment,
        tables: &[String],
        options: &CloneOptions,
    ) -> CloneResult {
        let mut result = CloneResult::new(options.dry_run);
        let anonymizer = options
            .anonymize
            .then(|| Anonymizer::new(target.name.clone(), now_timestamp()));

        for table in tables {
            info!("Cloning {}", table);
            let table_result = self
                .clone_table(source, target, table, options, anonymizer.as_ref())
                .await;
            match &table_result.error {
                Some(error) => warn!("✗ {}: {}", table, error),
                None => info!(
                    "✓ {}: {} -> {} records ({})",
                    table, table_result.source_records, table_result.target_records, table_result.status
                ),
            }
            for note in &table_result.adaptations {
                debug!("  {}: {}", table, note);
            }
            result.record(table, table_result);
        }

        result
    }

    /// Clones one table and reports the outcome.
    pub async fn clone_table(
        &self,
        source: &Environment,
        target: &Environment,
        table: &str,
        options: &CloneOptions,
        anonymizer: Option<&Anonymizer>,
    ) -> TableResult {
        let rows = match source.client.select_all(table, self.catalog.key_column(table)).await {
            Ok(rows) => rows,
            Err(error) => return TableResult::error(0, format!("Source read failed: {}", error)),
        };

        let mut notes = Vec::new();
        let rows = match anonymizer {
            Some(anonymizer) => {
                let anonymized = anonymizer.anonymize_table(table, rows);
                notes.extend(anonymized.note);
                anonymized.rows
            }
            None => rows,
        };

        if rows.is_empty() {
            let mut result = TableResult::empty();
            result.adaptations = notes;
            return result;
        }

        let source_records = count(rows.len());

        let schema = match discover_target_schema(target.client.as_ref(), table, &self.catalog).await {
            Ok(schema) => schema,
            Err(error) => {
                let mut result = TableResult::error(source_records, error.to_string());
                result.adaptations = notes;
                return result;
            }
        };

        let records = if options.adapt_schema {
            let adaptation = adapt_records(&rows, &schema, &now_timestamp());
            notes.extend(adaptation.notes());
            adaptation.records
        } else {
            rows
        };

        let mut result = TableResult {
            source_records,
            adaptations: notes,
            ..TableResult::default()
        };

        if options.dry_run {
            result.target_records = count(records.len());
            return result;
        }

        let key = self.catalog.key_column(table);
        if let Err(error) = target.client.delete_all(table, key, WIPE_SENTINEL).await
            && !error.is_no_rows()
        {
            result.status = TableStatus::Error;
            result.error = Some(format!("Target wipe failed: {}", error));
            return result;
        }

        result.target_records = self
            .insert_with_fallback(
                target.client.as_ref(),
                table,
                &records,
                &schema,
                options.batch_size,
                &mut result,
            )
            .await;
        result.reconcile_drop_note();
        result
    }

    /// Inserts `records` in batches, retrying failed batches row by row and
    /// failed rows in essential-column form. Returns the rows stored.
    pub async fn insert_with_fallback(
        &self,
        target: &dyn DataStore,
        table: &str,
        records: &[Record],
        schema: &TableSchema,
        batch_size: usize,
        result: &mut TableResult,
    ) -> u64 {
        let mut inserted = 0u64;
        let mut ultra = 0u64;

        for batch in records.chunks(batch_size.max(1)) {
            match target.insert(table, batch).await {
                Ok(()) => inserted = inserted.saturating_add(count(batch.len())),
                Err(error) => {
                    debug!("Batch insert into {} failed, retrying rows: {}", table, error);
                    for record in batch {
                        if target.insert(table, std::slice::from_ref(record)).await.is_ok() {
                            inserted = inserted.saturating_add(1);
                            continue;
                        }
                        if self.insert_essential(target, table, record, Some(schema)).await {
                            inserted = inserted.saturating_add(1);
                            ultra = ultra.saturating_add(1);
                        }
                    }
                }
            }
        }

        if ultra > 0 {
            result.note(format!("Ultra adaptation applied to {} records", ultra));
        }
        inserted
    }

    /// Last insert tier: the record reduced to its key and essential columns.
    pub(crate) async fn insert_essential(
        &self,
        target: &dyn DataStore,
        table: &str,
        record: &Record,
        schema: Option<&TableSchema>,
    ) -> bool {
        let reduced = essential_record(
            record,
            self.catalog.key_column(table),
            self.essential_columns(table, schema),
            schema,
        );
        if reduced.is_empty() {
            return false;
        }
        match target.insert(table, std::slice::from_ref(&reduced)).await {
            Ok(()) => true,
            Err(error) => {
                debug!("Essential insert into {} failed: {}", table, error);
                false
            }
        }
    }

    fn essential_columns<'a>(&'a self, table: &str, schema: Option<&TableSchema>) -> &'a [String] {
        let essentials = self.catalog.essential_columns(table);
        if essentials.is_empty() && schema.is_some() {
            GENERIC_ESSENTIALS.as_slice()
        } else {
            essentials
        }
    }
}

/// Essentials tried for tables the catalog has no entry for.
static GENERIC_ESSENTIALS: LazyLock<Vec<String>> = LazyLock::new(|| {
    ["name", "type", "status"]
        .iter()
        .map(ToString::to_string)
        .collect()
});

#[async_trait]
impl CloneStrategy for CloneEngine {
    async fn execute_clone(
        &self,
        source: &Environment,
        target: &Environment,
        options: &CloneOptions,
    ) -> crate::Result<CloneResult> {
        options.validate()?;
        let tables = options.resolve_tables(&self.catalog);
        info!(
            "Cloning {} tables from {} to {}{}",
            tables.len(),
            source.name,
            target.name,
            if options.dry_run { " (dry run)" } else { "" }
        );
        Ok(self.clone_tables(source, target, &tables, options).await)
    }
}
