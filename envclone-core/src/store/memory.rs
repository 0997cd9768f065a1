//! In-process datastore with configurable constraints.
//!
//! Tables are plain vectors of records. Per-table [`TableRules`] reproduce
//! the failure modes that matter when cloning between drifting schemas:
//! unknown columns, NOT NULL columns, foreign keys, unique keys, payload
//! limits and unreadable tables. Every call is appended to an operation log
//! so callers can assert exactly which writes were issued.

use super::{DataStore, StoreKind, StoreResult};
use crate::error::{StoreError, StoreOperation};
use crate::models::Record;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Constraints enforced on one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRules {
    /// Columns the table has; any other column is rejected on insert
    pub columns: Option<Vec<String>>,
    /// Columns that must be present and non-null on insert
    pub required: Vec<String>,
    /// `(column, referenced table)`: non-null values must match an `id` there
    pub references: Vec<(String, String)>,
    /// Column whose values must be unique
    pub unique: Option<String>,
    /// Largest accepted insert payload
    pub max_batch: Option<usize>,
    /// Reads fail with a permission error
    pub deny_reads: bool,
    /// Deletes fail with a permission error
    pub deny_deletes: bool,
}

impl TableRules {
    /// Rules restricting the table to `columns`.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: Some(columns.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Builder method adding NOT NULL columns.
    pub fn required<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Builder method adding a foreign key to `table.id`.
    pub fn references(mut self, column: &str, table: &str) -> Self {
        self.references.push((column.to_string(), table.to_string()));
        self
    }

    /// Builder method declaring a unique column.
    pub fn unique(mut self, column: &str) -> Self {
        self.unique = Some(column.to_string());
        self
    }

    /// Builder method limiting the insert payload size.
    pub fn max_batch(mut self, rows: usize) -> Self {
        self.max_batch = Some(rows);
        self
    }

    /// Builder method making every read fail.
    pub fn deny_reads(mut self) -> Self {
        self.deny_reads = true;
        self
    }

    /// Builder method making every delete fail.
    pub fn deny_deletes(mut self) -> Self {
        self.deny_deletes = true;
        self
    }
}

/// One call received by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    SelectAll { table: String },
    SelectSample { table: String, limit: usize },
    Count { table: String },
    Insert { table: String, rows: usize },
    DeleteAll { table: String, column: String },
}

impl StoreCall {
    /// True for inserts and deletes.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert { .. } | Self::DeleteAll { .. })
    }

    /// Table the call targeted.
    pub fn table(&self) -> &str {
        match self {
            Self::SelectAll { table }
            | Self::SelectSample { table, .. }
            | Self::Count { table }
            | Self::Insert { table, .. }
            | Self::DeleteAll { table, .. } => table,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: IndexMap<String, Vec<Record>>,
    rules: HashMap<String, TableRules>,
    offline: bool,
    calls: Vec<StoreCall>,
}

/// In-memory [`DataStore`].
///
/// # Example
/// ```rust
/// use envclone_core::store::{DataStore, MemoryStore};
/// use serde_json::json;
///
/// # async fn example() {
/// let store = MemoryStore::new()
///     .with_table("zone_areas", vec![json!({"id": "z1", "name": "North"})]);
/// assert_eq!(store.count("zone_areas").await.unwrap(), 1);
/// assert!(store.select_all("missing", "id").await.is_err());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn to_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Text form of a value, as compared by `col::text <> sentinel`.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Builder method adding a table with initial rows (JSON objects).
    pub fn with_table(self, table: &str, rows: Vec<Value>) -> Self {
        self.lock()
            .tables
            .insert(table.to_string(), rows.into_iter().map(to_record).collect());
        self
    }

    /// Builder method adding an empty table.
    pub fn with_empty_table(self, table: &str) -> Self {
        self.with_table(table, Vec::new())
    }

    /// Builder method attaching constraints to a table.
    pub fn with_rules(self, table: &str, rules: TableRules) -> Self {
        self.lock().rules.insert(table.to_string(), rules);
        self
    }

    /// Builder method making every call fail as unreachable.
    pub fn offline(self) -> Self {
        self.lock().offline = true;
        self
    }

    /// Current rows of a table (empty when the table does not exist).
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Number of inserts and deletes received so far.
    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_write()).count()
    }

    /// Forgets the operation log.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn check_table(
        state: &MemoryState,
        table: &str,
        operation: StoreOperation,
    ) -> StoreResult<()> {
        if state.offline {
            return Err(StoreError::new(table, operation, "connection refused"));
        }
        if !state.tables.contains_key(table) {
            return Err(StoreError::new(
                table,
                operation,
                format!("relation \"public.{}\" does not exist", table),
            )
            .with_code("42P01"));
        }
        Ok(())
    }

    fn rules<'a>(state: &'a MemoryState, table: &str) -> Option<&'a TableRules> {
        state.rules.get(table)
    }

    fn read(&self, table: &str, limit: Option<usize>, call: StoreCall) -> StoreResult<Vec<Record>> {
        let mut state = self.lock();
        state.calls.push(call);
        Self::check_table(&state, table, StoreOperation::Select)?;
        if Self::rules(&state, table).is_some_and(|r| r.deny_reads) {
            return Err(StoreError::new(
                table,
                StoreOperation::Select,
                format!("permission denied for table {}", table),
            )
            .with_code("42501"));
        }
        let rows = state.tables.get(table).cloned().unwrap_or_default();
        Ok(match limit {
            Some(limit) => rows.into_iter().take(limit).collect(),
            None => rows,
        })
    }

    fn validate_rows(state: &MemoryState, table: &str, rows: &[Record]) -> StoreResult<()> {
        let Some(rules) = Self::rules(state, table) else {
            return Ok(());
        };
        let error = |message: String, code: &str| {
            Err(StoreError::new(table, StoreOperation::Insert, message).with_code(code))
        };

        if let Some(max) = rules.max_batch
            && rows.len() > max
        {
            return error(format!("payload of {} rows exceeds limit", rows.len()), "413");
        }

        let existing = state.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        let mut seen_keys: Vec<String> = Vec::new();

        for row in rows {
            if let Some(columns) = &rules.columns
                && let Some(unknown) = row.keys().find(|key| !columns.contains(key))
            {
                return error(
                    format!(
                        "Could not find the '{}' column of '{}' in the schema cache",
                        unknown, table
                    ),
                    "PGRST204",
                );
            }

            for column in &rules.required {
                if row.get(column).is_none_or(Value::is_null) {
                    return error(
                        format!(
                            "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                            column, table
                        ),
                        "23502",
                    );
                }
            }

            for (column, referenced) in &rules.references {
                let Some(value) = row.get(column).and_then(value_text) else {
                    continue;
                };
                let found = state.tables.get(referenced).is_some_and(|rows| {
                    rows.iter()
                        .any(|r| r.get("id").and_then(value_text).as_deref() == Some(value.as_str()))
                });
                if !found {
                    return error(
                        format!(
                            "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\"",
                            table, table, column
                        ),
                        "23503",
                    );
                }
            }

            if let Some(unique) = &rules.unique
                && let Some(key) = row.get(unique).and_then(value_text)
            {
                let clash = seen_keys.contains(&key)
                    || existing
                        .iter()
                        .any(|r| r.get(unique).and_then(value_text).as_deref() == Some(key.as_str()));
                if clash {
                    return error(
                        format!(
                            "duplicate key value violates unique constraint \"{}_pkey\"",
                            table
                        ),
                        "23505",
                    );
                }
                seen_keys.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select_all(&self, table: &str, _order_by: &str) -> StoreResult<Vec<Record>> {
        self.read(
            table,
            None,
            StoreCall::SelectAll {
                table: table.to_string(),
            },
        )
    }

    async fn select_sample(&self, table: &str, limit: usize) -> StoreResult<Vec<Record>> {
        self.read(
            table,
            Some(limit),
            StoreCall::SelectSample {
                table: table.to_string(),
                limit,
            },
        )
    }

    async fn count(&self, table: &str) -> StoreResult<u64> {
        let rows = self.read(
            table,
            None,
            StoreCall::Count {
                table: table.to_string(),
            },
        )?;
        Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
    }

    async fn insert(&self, table: &str, rows: &[Record]) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Insert {
            table: table.to_string(),
            rows: rows.len(),
        });
        Self::check_table(&state, table, StoreOperation::Insert)?;
        Self::validate_rows(&state, table, rows)?;

        if let Some(existing) = state.tables.get_mut(table) {
            existing.extend(rows.iter().cloned());
        }
        Ok(())
    }

    async fn delete_all(&self, table: &str, column: &str, sentinel: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::DeleteAll {
            table: table.to_string(),
            column: column.to_string(),
        });
        Self::check_table(&state, table, StoreOperation::Delete)?;

        if let Some(rules) = Self::rules(&state, table) {
            if rules.deny_deletes {
                return Err(StoreError::new(
                    table,
                    StoreOperation::Delete,
                    format!("permission denied for table {}", table),
                )
                .with_code("42501"));
            }
            if rules
                .columns
                .as_ref()
                .is_some_and(|columns| !columns.iter().any(|c| c == column))
            {
                return Err(StoreError::new(
                    table,
                    StoreOperation::Delete,
                    format!("column {}.{} does not exist", table, column),
                )
                .with_code("42703"));
            }
        }

        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| match row.get(column).and_then(value_text) {
                Some(value) => value == sentinel,
                None => true,
            });
        }
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }
}
