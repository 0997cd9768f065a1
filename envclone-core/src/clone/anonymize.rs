//! Scrubbing of sensitive fields before rows reach a non-production target.
//!
//! Only columns already present on a row are rewritten; anonymization never
//! adds columns.

use crate::models::Record;
use rand::Rng;
use serde_json::Value;

/// Replacement text for scrubbed message bodies.
pub const ANONYMIZED_MESSAGE: &str = "Anonymized test message";

const SUFFIX_LEN: usize = 6;
const SUFFIX_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Rewrites sensitive fields for a target environment.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    target: String,
    now: String,
}

/// Rows after anonymization, plus a note when anything changed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymizedRows {
    pub rows: Vec<Record>,
    pub note: Option<String>,
}

fn set_if_present(record: &mut Record, column: &str, value: Value) {
    if let Some(slot) = record.get_mut(column) {
        *slot = value;
    }
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())]))
        .collect()
}

impl Anonymizer {
    /// Creates an anonymizer stamping `target` into rewritten addresses and
    /// `now` into refreshed timestamps.
    pub fn new(target: impl Into<String>, now: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            now: now.into(),
        }
    }

    /// First six characters of the row id, or a random suffix.
    fn stable_suffix(record: &Record) -> String {
        let id = match record.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        if id.is_empty() {
            random_suffix()
        } else {
            id.chars().take(SUFFIX_LEN).collect()
        }
    }

    /// Applies the rule set of `table` to its rows.
    ///
    /// Tables without rules pass through unchanged.
    pub fn anonymize_table(&self, table: &str, rows: Vec<Record>) -> AnonymizedRows {
        let count = rows.len();
        match table {
            "profiles" => AnonymizedRows {
                rows: rows.into_iter().map(|r| self.profile(r)).collect(),
                note: Some(format!("Anonymized {} profiles", count)),
            },
            "user_sessions" => AnonymizedRows {
                rows: Vec::new(),
                note: Some(format!("Anonymization removed all {} sessions", count)),
            },
            "notifications" => AnonymizedRows {
                rows: rows.into_iter().map(|r| self.notification(r)).collect(),
                note: Some(format!("Anonymized {} notifications", count)),
            },
            "messages" => AnonymizedRows {
                rows: rows.into_iter().map(Self::message).collect(),
                note: Some(format!("Anonymized {} messages", count)),
            },
            _ => AnonymizedRows { rows, note: None },
        }
    }

    fn profile(&self, mut record: Record) -> Record {
        let suffix = Self::stable_suffix(&record);
        let is_admin = record.get("role").and_then(Value::as_str) == Some("admin");
        let email = if is_admin {
            format!("admin@{}.local", self.target)
        } else {
            format!("user_{}@{}.local", suffix, self.target)
        };
        set_if_present(&mut record, "email", Value::String(email));

        let full_name = match record.get("full_name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => {
                format!("{} ({})", name, self.target.to_uppercase())
            }
            _ => format!("User {}", suffix.to_uppercase()),
        };
        set_if_present(&mut record, "full_name", Value::String(full_name));

        set_if_present(&mut record, "airbnb_access_token", Value::Null);
        set_if_present(&mut record, "airbnb_refresh_token", Value::Null);
        set_if_present(&mut record, "updated_at", Value::String(self.now.clone()));
        record
    }

    fn notification(&self, mut record: Record) -> Record {
        if record
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| m.contains('@'))
        {
            set_if_present(
                &mut record,
                "message",
                Value::String(ANONYMIZED_MESSAGE.to_string()),
            );
        }
        set_if_present(&mut record, "is_read", Value::Bool(true));
        set_if_present(&mut record, "read_at", Value::String(self.now.clone()));
        record
    }

    fn message(mut record: Record) -> Record {
        set_if_present(
            &mut record,
            "content",
            Value::String(ANONYMIZED_MESSAGE.to_string()),
        );
        if let Some(metadata) = record.get_mut("metadata") {
            if let Value::Object(map) = metadata {
                map.insert("anonymized".to_string(), Value::Bool(true));
            } else {
                *metadata = Value::Null;
            }
        }
        record
    }
}
