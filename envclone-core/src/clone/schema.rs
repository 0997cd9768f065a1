//! Target schema discovery.

use crate::config::TableCatalog;
use crate::error::EnvCloneError;
use crate::store::DataStore;
use tracing::debug;

/// Where a discovered column set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    /// Keys of a row sampled from the target
    TargetSample,
    /// Static fallback list from the catalog
    KnownColumns,
}

/// Column set of a target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<String>,
    pub source: SchemaSource,
}

impl TableSchema {
    /// True when the table has `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Discovers the target's column set for `table`.
///
/// Samples one row from the target; if the table is empty or unreadable,
/// falls back to the catalog's known columns.
///
/// # Errors
/// Returns `SchemaUnknown` when neither source yields a column list.
pub async fn discover_target_schema(
    target: &dyn DataStore,
    table: &str,
    catalog: &TableCatalog,
) -> crate::Result<TableSchema> {
    match target.select_sample(table, 1).await {
        Ok(rows) => {
            if let Some(row) = rows.first().filter(|row| !row.is_empty()) {
                return Ok(TableSchema {
                    table: table.to_string(),
                    columns: row.keys().cloned().collect(),
                    source: SchemaSource::TargetSample,
                });
            }
        }
        Err(error) => debug!("Schema sample of {} failed: {}", table, error),
    }

    catalog
        .known_columns(table)
        .map(|columns| TableSchema {
            table: table.to_string(),
            columns: columns.to_vec(),
            source: SchemaSource::KnownColumns,
        })
        .ok_or_else(|| EnvCloneError::SchemaUnknown {
            table: table.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_sampled_schema_wins() {
        let store = MemoryStore::new().with_table("zone_areas", vec![json!({"id": "z", "name": "N"})]);
        let catalog = TableCatalog::builtin().unwrap();

        let schema = discover_target_schema(&store, "zone_areas", &catalog).await.unwrap();
        assert_eq!(schema.columns, vec!["id", "name"]);
        assert_eq!(schema.source, SchemaSource::TargetSample);
    }

    #[tokio::test]
    async fn test_empty_table_uses_known_columns() {
        let store = MemoryStore::new().with_empty_table("zone_areas");
        let catalog = TableCatalog::builtin().unwrap();

        let schema = discover_target_schema(&store, "zone_areas", &catalog).await.unwrap();
        assert_eq!(schema.source, SchemaSource::KnownColumns);
        assert!(schema.has_column("created_at"));
    }

    #[tokio::test]
    async fn test_unknown_table_without_rows_fails() {
        let store = MemoryStore::new().with_empty_table("legacy_invoices");
        let catalog = TableCatalog::builtin().unwrap();

        let error = discover_target_schema(&store, "legacy_invoices", &catalog)
            .await
            .unwrap_err();
        assert!(matches!(error, EnvCloneError::SchemaUnknown { .. }));
    }
}
