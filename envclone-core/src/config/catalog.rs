//! Table catalog: dependency order, default clone set and known columns.
//!
//! The catalog is data, not code. A built-in copy is embedded from
//! `catalog.json`; operators can point at a corrected file with
//! `--catalog` without touching engine logic.

use crate::error::EnvCloneError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("catalog.json");
const DEFAULT_KEY_COLUMN: &str = "id";

/// Named group of tables in the dependency order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGroup {
    pub name: String,
    pub tables: Vec<String>,
}

/// Static knowledge about one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Fallback column list used when the target table is empty
    #[serde(default)]
    pub columns: Vec<String>,
    /// Minimal columns kept (besides the key) by the last-resort insert
    #[serde(default)]
    pub essential: Vec<String>,
    /// Column used by the delete-all idiom; `id` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Dependency-ordered table catalog.
///
/// Invariant: a table appears at most once across all groups, and a
/// table is never listed before any table it references.
///
/// # Example
/// ```rust
/// use envclone_core::config::TableCatalog;
///
/// let catalog = TableCatalog::builtin().unwrap();
/// let order = catalog.dependency_order();
/// let owners = order.iter().position(|t| *t == "loft_owners").unwrap();
/// let lofts = order.iter().position(|t| *t == "lofts").unwrap();
/// assert!(owners < lofts);
/// assert_eq!(catalog.key_column("settings"), "key");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCatalog {
    pub order: Vec<DependencyGroup>,
    #[serde(default)]
    pub default_tables: Vec<String>,
    #[serde(default)]
    pub tables: IndexMap<String, TableSpec>,
}

impl TableCatalog {
    /// Loads the catalog embedded in the binary.
    ///
    /// # Errors
    /// Returns a serialization error if the embedded document is malformed.
    pub fn builtin() -> crate::Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Loads a catalog from a JSON file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a serialization
    /// or configuration error if its contents are invalid.
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EnvCloneError::io(format!("Failed to read catalog {}", path.display()), e)
        })?;
        Self::from_json(&contents)
    }

    /// Parses and validates a catalog document.
    ///
    /// # Errors
    /// Returns a serialization error for malformed JSON and a configuration
    /// error when validation fails.
    pub fn from_json(contents: &str) -> crate::Result<Self> {
        let catalog: Self = serde_json::from_str(contents)
            .map_err(|e| EnvCloneError::serialization("Failed to parse table catalog", e))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validates the catalog.
    ///
    /// # Errors
    /// Returns a configuration error if a table is listed twice in the
    /// dependency order or a group is empty.
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for group in &self.order {
            if group.tables.is_empty() {
                return Err(EnvCloneError::configuration(format!(
                    "Dependency group '{}' lists no tables",
                    group.name
                )));
            }
            for table in &group.tables {
                if !seen.insert(table.as_str()) {
                    return Err(EnvCloneError::configuration(format!(
                        "Table '{}' appears more than once in the dependency order",
                        table
                    )));
                }
            }
        }
        Ok(())
    }

    /// All tables in insertion order.
    pub fn dependency_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .flat_map(|group| group.tables.iter().map(String::as_str))
            .collect()
    }

    /// Group that contains a table, if any.
    pub fn group_of(&self, table: &str) -> Option<&str> {
        self.order
            .iter()
            .find(|group| group.tables.iter().any(|t| t == table))
            .map(|group| group.name.as_str())
    }

    /// Splits the requested tables into those known to the dependency
    /// order, sorted by that order, and those it does not list.
    pub fn order_tables(&self, requested: &[String]) -> (Vec<String>, Vec<String>) {
        let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
        let order = self.dependency_order();

        let ordered = order
            .iter()
            .filter(|table| wanted.contains(*table))
            .map(|table| (*table).to_string())
            .collect();

        let mut unlisted = Vec::new();
        for table in requested {
            if !order.contains(&table.as_str()) && !unlisted.contains(table) {
                unlisted.push(table.clone());
            }
        }

        (ordered, unlisted)
    }

    /// Fallback column list for a table, if one is known.
    pub fn known_columns(&self, table: &str) -> Option<&[String]> {
        self.tables
            .get(table)
            .map(|spec| spec.columns.as_slice())
            .filter(|columns| !columns.is_empty())
    }

    /// Essential columns kept by the last-resort insert tier.
    pub fn essential_columns(&self, table: &str) -> &[String] {
        self.tables
            .get(table)
            .map(|spec| spec.essential.as_slice())
            .unwrap_or_default()
    }

    /// Column used to match every row when wiping a table.
    pub fn key_column(&self, table: &str) -> &str {
        self.tables
            .get(table)
            .and_then(|spec| spec.key.as_deref())
            .unwrap_or(DEFAULT_KEY_COLUMN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = TableCatalog::builtin().unwrap();
        assert_eq!(catalog.order.len(), 6);
        assert_eq!(catalog.default_tables.len(), 12);
        for table in &catalog.default_tables {
            assert!(
                catalog.dependency_order().contains(&table.as_str()),
                "default table {} missing from order",
                table
            );
        }
    }

    #[test]
    fn test_order_tables_sorts_and_reports_unlisted() {
        let catalog = TableCatalog::builtin().unwrap();
        let requested = vec![
            "tasks".to_string(),
            "legacy_invoices".to_string(),
            "zone_areas".to_string(),
            "lofts".to_string(),
        ];

        let (ordered, unlisted) = catalog.order_tables(&requested);
        assert_eq!(ordered, vec!["zone_areas", "lofts", "tasks"]);
        assert_eq!(unlisted, vec!["legacy_invoices"]);
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let json = r#"{"order":[{"name":"a","tables":["x"]},{"name":"b","tables":["x"]}]}"#;
        let error = TableCatalog::from_json(json).unwrap_err();
        assert!(error.to_string().contains("more than once"));
    }

    #[test]
    fn test_lookups_fall_back() {
        let catalog = TableCatalog::builtin().unwrap();
        assert_eq!(catalog.key_column("lofts"), "id");
        assert_eq!(catalog.key_column("unknown_table"), "id");
        assert!(catalog.known_columns("unknown_table").is_none());
        assert!(catalog.essential_columns("unknown_table").is_empty());
        assert_eq!(catalog.group_of("messages"), Some("communications"));
        assert_eq!(
            catalog.essential_columns("internet_connection_types"),
            ["type".to_string(), "status".to_string()]
        );
    }
}
