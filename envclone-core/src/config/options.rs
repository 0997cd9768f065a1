//! Per-run clone options.

use super::TableCatalog;
use serde::{Deserialize, Serialize};

/// Switches for one clone run.
///
/// # Example
/// ```rust
/// use envclone_core::config::CloneOptions;
///
/// let options = CloneOptions::new()
///     .with_dry_run(true)
///     .with_batch_size(25)
///     .with_exclude_tables(vec!["settings".to_string()]);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOptions {
    /// Read and adapt, but never delete or insert
    pub dry_run: bool,
    /// Records per insert batch
    pub batch_size: usize,
    /// Explicit table list; the catalog's default set when `None`
    pub include_tables: Option<Vec<String>>,
    /// Tables removed from the resolved list
    pub exclude_tables: Vec<String>,
    /// Project records onto the target schema before inserting
    pub adapt_schema: bool,
    /// Scrub sensitive fields before inserting
    pub anonymize: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: 50,
            include_tables: None,
            exclude_tables: Vec::new(),
            adapt_schema: true,
            anonymize: false,
        }
    }
}

impl CloneOptions {
    /// Creates options with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builder method to set the insert batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set an explicit table list.
    pub fn with_include_tables(mut self, tables: Vec<String>) -> Self {
        self.include_tables = Some(tables);
        self
    }

    /// Builder method to set the excluded tables.
    pub fn with_exclude_tables(mut self, tables: Vec<String>) -> Self {
        self.exclude_tables = tables;
        self
    }

    /// Builder method to toggle schema adaptation.
    pub fn with_adapt_schema(mut self, adapt: bool) -> Self {
        self.adapt_schema = adapt;
        self
    }

    /// Builder method to toggle anonymization.
    pub fn with_anonymize(mut self, anonymize: bool) -> Self {
        self.anonymize = anonymize;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    /// Returns a configuration error if `batch_size` is zero or the
    /// explicit table list is empty.
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::error::EnvCloneError::configuration(
                "batch_size must be greater than 0",
            ));
        }
        if self.include_tables.as_ref().is_some_and(Vec::is_empty) {
            return Err(crate::error::EnvCloneError::configuration(
                "include list must name at least one table",
            ));
        }
        Ok(())
    }

    /// Tables this run touches: the include list (or the catalog's default
    /// set) minus the exclude list, in the order given.
    pub fn resolve_tables(&self, catalog: &TableCatalog) -> Vec<String> {
        self.include_tables
            .as_ref()
            .unwrap_or(&catalog.default_tables)
            .iter()
            .filter(|table| !self.exclude_tables.contains(table))
            .cloned()
            .collect()
    }
}

/// Splits a comma-separated CLI table list, ignoring blanks.
///
/// ```rust
/// use envclone_core::config::parse_table_list;
///
/// assert_eq!(parse_table_list(" lofts, ,tasks "), vec!["lofts", "tasks"]);
/// ```
pub fn parse_table_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|table| !table.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CloneOptions::default();
        assert_eq!(options.batch_size, 50);
        assert!(options.adapt_schema);
        assert!(!options.dry_run);
        assert!(!options.anonymize);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(CloneOptions::new().with_batch_size(0).validate().is_err());
        assert!(
            CloneOptions::new()
                .with_include_tables(Vec::new())
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_resolve_tables_applies_exclude() {
        let catalog = TableCatalog::builtin().unwrap();
        let tables = CloneOptions::new()
            .with_exclude_tables(vec!["settings".to_string(), "tasks".to_string()])
            .resolve_tables(&catalog);
        assert_eq!(tables.len(), 10);
        assert!(!tables.contains(&"settings".to_string()));

        let tables = CloneOptions::new()
            .with_include_tables(vec!["lofts".to_string(), "profiles".to_string()])
            .with_exclude_tables(vec!["profiles".to_string()])
            .resolve_tables(&catalog);
        assert_eq!(tables, vec!["lofts"]);
    }
}
