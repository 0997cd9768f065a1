//! Per-table repair of source rows for the post-processing pass.
//!
//! Tables with a dedicated fixer are rebuilt from a fixed field list: the
//! key plus each listed field, taking the source value when it is present
//! and non-blank and the fill otherwise. Every other table keeps all of
//! its columns and only gains missing timestamps.

use super::adapt::is_blank;
use crate::models::Record;
use crate::store::DataStore;
use serde_json::{Number, Value};
use std::collections::HashMap;
use tracing::debug;

/// Rows sampled from a reference table when looking for a default id.
pub const REFERENCE_SAMPLE_SIZE: usize = 10;

/// How a blank field is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Text(&'static str),
    Number(i64),
    /// Current time as an ISO-8601 string
    Now,
    /// Null when blank
    Null,
    /// Always null, regardless of the source value
    Cleared,
    /// Id of the first row of a target table, null if it has none
    FirstIdOf(&'static str),
}

type FieldList = &'static [(&'static str, Fill)];

const INTERNET_CONNECTION_TYPES: FieldList = &[
    ("type", Fill::Text("Unknown")),
    ("speed", Fill::Text("0 Mbps")),
    ("provider", Fill::Text("Unknown")),
    ("status", Fill::Text("active")),
    ("cost", Fill::Number(0)),
    ("created_at", Fill::Now),
];

const LOFTS: FieldList = &[
    ("name", Fill::Text("Imported loft")),
    ("address", Fill::Text("Address not specified")),
    ("price_per_month", Fill::Number(10000)),
    ("status", Fill::Text("available")),
    ("description", Fill::Text("")),
    ("owner_id", Fill::FirstIdOf("loft_owners")),
    ("zone_area_id", Fill::FirstIdOf("zone_areas")),
    ("internet_connection_type_id", Fill::FirstIdOf("internet_connection_types")),
    ("company_percentage", Fill::Number(20)),
    ("owner_percentage", Fill::Number(80)),
    ("frequence_paiement_eau", Fill::Null),
    ("prochaine_echeance_eau", Fill::Null),
    ("frequence_paiement_energie", Fill::Null),
    ("prochaine_echeance_energie", Fill::Null),
    ("frequence_paiement_telephone", Fill::Null),
    ("prochaine_echeance_telephone", Fill::Null),
    ("frequence_paiement_internet", Fill::Null),
    ("prochaine_echeance_internet", Fill::Null),
    ("frequence_paiement_tv", Fill::Null),
    ("prochaine_echeance_tv", Fill::Null),
    ("created_at", Fill::Now),
    ("updated_at", Fill::Now),
];

const TASKS: FieldList = &[
    ("title", Fill::Text("Imported task")),
    ("description", Fill::Text("")),
    ("status", Fill::Text("todo")),
    ("priority", Fill::Text("medium")),
    ("assigned_to", Fill::Cleared),
    ("team_id", Fill::FirstIdOf("teams")),
    ("loft_id", Fill::FirstIdOf("lofts")),
    ("due_date", Fill::Null),
    ("created_by", Fill::Cleared),
    ("created_at", Fill::Now),
    ("updated_at", Fill::Now),
    ("completed_at", Fill::Null),
];

const TEAMS: FieldList = &[
    ("name", Fill::Text("Imported team")),
    ("description", Fill::Text("")),
    ("created_by", Fill::Cleared),
    ("created_at", Fill::Now),
    ("updated_at", Fill::Now),
];

/// Repair strategy for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFixer {
    /// Rebuild from a fixed field list
    Fields(FieldList),
    /// Keep every column, add missing timestamps
    Generic { with_updated_at: bool },
}

impl TableFixer {
    /// Strategy used for `table`.
    fn for_table(table: &str) -> Self {
        match table {
            "internet_connection_types" => Self::Fields(INTERNET_CONNECTION_TYPES),
            "lofts" => Self::Fields(LOFTS),
            "tasks" => Self::Fields(TASKS),
            "teams" => Self::Fields(TEAMS),
            "settings" => Self::Generic {
                with_updated_at: false,
            },
            _ => Self::Generic {
                with_updated_at: true,
            },
        }
    }

    fn reference_tables(self) -> Vec<&'static str> {
        match self {
            Self::Fields(fields) => fields
                .iter()
                .filter_map(|(_, fill)| match fill {
                    Fill::FirstIdOf(table) => Some(*table),
                    _ => None,
                })
                .collect(),
            Self::Generic { .. } => Vec::new(),
        }
    }

    /// Repairs one record. `references` maps reference tables to the id
    /// used when a foreign key is blank.
    fn apply(
        self,
        record: &Record,
        key: &str,
        now: &str,
        references: &HashMap<&'static str, Value>,
    ) -> Record {
        let now_value = || Value::String(now.to_string());
        match self {
            Self::Generic { with_updated_at } => {
                let mut fixed = record.clone();
                if is_blank(fixed.get("created_at")) {
                    fixed.insert("created_at".to_string(), now_value());
                }
                if with_updated_at && is_blank(fixed.get("updated_at")) {
                    fixed.insert("updated_at".to_string(), now_value());
                }
                fixed
            }
            Self::Fields(fields) => {
                let mut fixed = Record::new();
                fixed.insert(
                    key.to_string(),
                    record.get(key).cloned().unwrap_or(Value::Null),
                );
                for (column, fill) in fields {
                    let value = match fill {
                        Fill::Cleared => Value::Null,
                        _ if !is_blank(record.get(*column)) => {
                            record.get(*column).cloned().unwrap_or(Value::Null)
                        }
                        Fill::Text(text) => Value::String((*text).to_string()),
                        Fill::Number(n) => Value::Number(Number::from(*n)),
                        Fill::Now => now_value(),
                        Fill::Null => Value::Null,
                        Fill::FirstIdOf(table) => {
                            references.get(table).cloned().unwrap_or(Value::Null)
                        }
                    };
                    fixed.insert((*column).to_string(), value);
                }
                fixed
            }
        }
    }
}

/// Id of the first row of `table` in the target, if any.
async fn first_id(target: &dyn DataStore, table: &str) -> Option<Value> {
    match target.select_sample(table, REFERENCE_SAMPLE_SIZE).await {
        Ok(rows) => rows
            .first()
            .and_then(|row| row.get("id"))
            .filter(|id| !id.is_null())
            .cloned(),
        Err(error) => {
            debug!("No default id from {}: {}", table, error);
            None
        }
    }
}

/// Repairs `records` of `table` for insertion into `target`.
///
/// Blank foreign keys are pointed at the first existing row of the
/// referenced target table; each reference table is sampled once.
pub async fn fix_records(
    target: &dyn DataStore,
    table: &str,
    key: &str,
    records: &[Record],
    now: &str,
) -> Vec<Record> {
    let fixer = TableFixer::for_table(table);

    let mut references = HashMap::new();
    for reference in fixer.reference_tables() {
        if let Some(id) = first_id(target, reference).await {
            references.insert(reference, id);
        }
    }

    records
        .iter()
        .map(|record| fixer.apply(record, key, now, &references))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    const NOW: &str = "2025-01-01T00:00:00.000Z";

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_lofts_get_reference_defaults() {
        let target = MemoryStore::new()
            .with_table("loft_owners", vec![json!({"id": "o1"}), json!({"id": "o2"})])
            .with_table("zone_areas", vec![json!({"id": "z1"})])
            .with_empty_table("internet_connection_types");

        let fixed = fix_records(
            &target,
            "lofts",
            "id",
            &[record(json!({"id": "l1", "name": "", "owner_id": null, "legacy": true}))],
            NOW,
        )
        .await;

        let loft = &fixed[0];
        assert_eq!(loft["id"], json!("l1"));
        assert_eq!(loft["name"], json!("Imported loft"));
        assert_eq!(loft["owner_id"], json!("o1"));
        assert_eq!(loft["zone_area_id"], json!("z1"));
        assert_eq!(loft["internet_connection_type_id"], Value::Null);
        assert_eq!(loft["price_per_month"], json!(10000));
        assert_eq!(loft["created_at"], json!(NOW));
        assert!(loft.get("legacy").is_none());
    }

    #[tokio::test]
    async fn test_tasks_clear_user_references() {
        let target = MemoryStore::new()
            .with_table("teams", vec![json!({"id": "t1"})])
            .with_table("lofts", vec![json!({"id": "l1"})]);

        let fixed = fix_records(
            &target,
            "tasks",
            "id",
            &[record(json!({"id": 7, "title": "Fix sink", "assigned_to": "u1", "created_by": "u2"}))],
            NOW,
        )
        .await;

        assert_eq!(fixed[0]["title"], json!("Fix sink"));
        assert_eq!(fixed[0]["assigned_to"], Value::Null);
        assert_eq!(fixed[0]["created_by"], Value::Null);
        assert_eq!(fixed[0]["team_id"], json!("t1"));
        assert_eq!(fixed[0]["status"], json!("todo"));
    }

    #[tokio::test]
    async fn test_generic_fix_adds_timestamps() {
        let target = MemoryStore::new();
        let rows = [record(json!({"id": 1, "label": "x"}))];

        let fixed = fix_records(&target, "payment_methods", "id", &rows, NOW).await;
        assert_eq!(fixed[0]["label"], json!("x"));
        assert_eq!(fixed[0]["updated_at"], json!(NOW));

        let fixed = fix_records(&target, "settings", "key", &[record(json!({"key": "k"}))], NOW).await;
        assert_eq!(fixed[0]["created_at"], json!(NOW));
        assert!(fixed[0].get("updated_at").is_none());
    }
}
