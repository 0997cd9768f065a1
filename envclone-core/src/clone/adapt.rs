//! Column projection of source records onto a target schema.

use super::schema::TableSchema;
use crate::models::Record;
use serde_json::Value;

/// Columns defaulted to the current time when the source lacks them.
pub const TIMESTAMP_COLUMNS: &[&str] = &["created_at", "updated_at"];

/// Columns tried, in order, for the default value of `name`.
const NAME_FALLBACKS: &[&str] = &["name", "title"];

/// Records projected onto a target schema plus what changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adaptation {
    pub records: Vec<Record>,
    /// Source columns absent from the target
    pub dropped_columns: Vec<String>,
    /// Target columns filled with the current time in at least one record
    pub defaulted_columns: Vec<String>,
    /// Target columns absent from the source and left unset
    pub unset_columns: Vec<String>,
}

impl Adaptation {
    /// Human-readable notes for the table result.
    pub fn notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if !self.dropped_columns.is_empty() {
            notes.push(format!("Dropped columns: {}", self.dropped_columns.join(", ")));
        }
        if !self.defaulted_columns.is_empty() {
            notes.push(format!(
                "Defaulted columns: {}",
                self.defaulted_columns.join(", ")
            ));
        }
        if !self.unset_columns.is_empty() {
            notes.push(format!(
                "Columns missing from source left unset: {}",
                self.unset_columns.join(", ")
            ));
        }
        notes
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Projects every record onto exactly the schema's columns.
///
/// Shared columns are copied as-is. Missing timestamp columns get `now`;
/// other missing columns stay absent. Source-only columns are dropped.
pub fn adapt_records(records: &[Record], schema: &TableSchema, now: &str) -> Adaptation {
    let mut adaptation = Adaptation::default();

    for record in records {
        for column in record.keys() {
            if !schema.has_column(column) {
                push_unique(&mut adaptation.dropped_columns, column);
            }
        }

        let mut adapted = Record::new();
        for column in &schema.columns {
            if let Some(value) = record.get(column) {
                adapted.insert(column.clone(), value.clone());
            } else if TIMESTAMP_COLUMNS.contains(&column.as_str()) {
                adapted.insert(column.clone(), Value::String(now.to_string()));
                push_unique(&mut adaptation.defaulted_columns, column);
            } else {
                push_unique(&mut adaptation.unset_columns, column);
            }
        }
        adaptation.records.push(adapted);
    }

    adaptation
}

/// True for values treated as missing by repair passes: absent, null or "".
pub(crate) fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn essential_default(record: &Record, column: &str) -> Option<Value> {
    let text = |s: &str| Some(Value::String(s.to_string()));
    match column {
        "name" => NAME_FALLBACKS
            .iter()
            .find_map(|c| record.get(*c).filter(|v| !is_blank(Some(v))).cloned())
            .or_else(|| text("Imported")),
        "title" => text("Imported"),
        "type" => text("default"),
        "status" => text("active"),
        "code" => text("XXX"),
        "symbol" => text("?"),
        _ => None,
    }
}

/// Last-resort reduction of a record: the key column plus the table's
/// essential columns, with placeholders for blank essentials that have one.
///
/// When `schema` is given, columns the target does not have are left out.
pub fn essential_record(
    record: &Record,
    key: &str,
    essentials: &[String],
    schema: Option<&TableSchema>,
) -> Record {
    let allowed = |column: &str| schema.is_none_or(|s| s.has_column(column));
    let mut reduced = Record::new();

    if let Some(value) = record.get(key)
        && allowed(key)
    {
        reduced.insert(key.to_string(), value.clone());
    }

    for column in essentials {
        if !allowed(column) || column == key {
            continue;
        }
        let value = record
            .get(column)
            .filter(|v| !is_blank(Some(v)))
            .cloned()
            .or_else(|| essential_default(record, column));
        if let Some(value) = value {
            reduced.insert(column.clone(), value);
        }
    }

    reduced
}

/// Drops the keys of `record` the schema does not have.
pub fn project(record: Record, schema: &TableSchema) -> Record {
    record
        .into_iter()
        .filter(|(column, _)| schema.has_column(column))
        .collect()
}
