//! The record data model (§3 DATA MODEL).
//!
//! A `Record` is an external, immutable, heterogeneous field map keyed by a
//! stable primary key (`record_id`, e.g. `requestid`). The core never owns
//! record mutation; it only reads records to serialize and index them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar field value as it arrives from the upstream system.
///
/// Upstream sources are typically CSV-derived JSON, so field types are
/// loosely typed at the boundary; the serializer stringifies whatever it
/// finds deterministically (see [`crate::serializer`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A 2-D coordinate pair, rendered as a single composite label.
    Coordinate { x: f64, y: f64 },
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Null) || matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    /// Deterministic, locale-independent scalar stringification (§4A edge cases).
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            // Fixed-point, not locale/grouping-dependent; trims a trailing ".0".
            FieldValue::Float(f) => {
                let s = format!("{:.6}", f);
                let s = s.trim_end_matches('0').trim_end_matches('.').to_string();
                if s.is_empty() || s == "-" {
                    "0".to_string()
                } else {
                    s
                }
            }
            FieldValue::Text(s) => s.clone(),
            FieldValue::Coordinate { x, y } => format!("{},{}", x, y),
        }
    }
}

/// A single upstream record: a stable primary key plus an arbitrary field map.
///
/// `BTreeMap` keeps iteration order deterministic, which matters for the
/// Field Serializer's tolerant name-matching fallback scan (§4A) and for
/// reproducible test fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Summary columns extracted from a record for structured predicates (§4C/§6).
///
/// This is the projection the Vector Store persists alongside chunks so the
/// Retriever can issue `WHERE` predicates without re-parsing chunk text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSummary {
    pub record_id: String,
    pub project: Option<String>,
    pub type_id: Option<i64>,
    pub status_id: Option<i64>,
    pub status_date: Option<String>,
    pub updater: Option<String>,
    pub creator: Option<String>,
    pub responsible_employee: Option<String>,
    pub contact_email: Option<String>,
    pub area: Option<String>,
    pub remarks: Option<String>,
    pub urgent: Option<bool>,
}

impl RecordSummary {
    /// Build a summary by tolerant-matching the well-known structured column
    /// names against a record's field map (same matching rules as §4A).
    pub fn from_record(record: &Record) -> Self {
        use crate::serializer::find_field;

        let text_of = |name: &str| -> Option<String> {
            find_field(&record.fields, name).and_then(|v| {
                let s = v.to_display_string();
                if s.trim().is_empty() {
                    None
                } else {
                    Some(s)
                }
            })
        };
        let int_of = |name: &str| -> Option<i64> {
            find_field(&record.fields, name).and_then(|v| match v {
                FieldValue::Int(i) => Some(*i),
                FieldValue::Float(f) => Some(*f as i64),
                FieldValue::Text(s) => s.trim().parse().ok(),
                _ => None,
            })
        };
        let bool_of = |name: &str| -> Option<bool> {
            find_field(&record.fields, name).and_then(|v| match v {
                FieldValue::Bool(b) => Some(*b),
                FieldValue::Text(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "1" | "yes" => Some(true),
                    "false" | "0" | "no" => Some(false),
                    _ => None,
                },
                FieldValue::Int(i) => Some(*i != 0),
                _ => None,
            })
        };

        RecordSummary {
            record_id: record.record_id.clone(),
            project: text_of("project"),
            type_id: int_of("type_id"),
            status_id: int_of("status_id"),
            status_date: text_of("status_date"),
            updater: text_of("updater"),
            creator: text_of("creator"),
            responsible_employee: text_of("responsible_employee"),
            contact_email: text_of("contact_email"),
            area: text_of("area"),
            remarks: text_of("remarks"),
            urgent: bool_of("urgent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_display_trims_trailing_zeros() {
        assert_eq!(FieldValue::Float(3.0).to_display_string(), "3");
        assert_eq!(FieldValue::Float(3.5).to_display_string(), "3.5");
        assert_eq!(FieldValue::Float(0.0).to_display_string(), "0");
    }

    #[test]
    fn coordinate_renders_as_composite() {
        let v = FieldValue::Coordinate { x: 1.0, y: 2.0 };
        assert_eq!(v.to_display_string(), "1,2");
    }

    #[test]
    fn record_summary_tolerant_matches_fields() {
        let record = Record::new("R1")
            .with_field("Type ID", FieldValue::Int(4))
            .with_field("STATUS-ID", FieldValue::Int(2))
            .with_field("updater", FieldValue::Text("Dana".into()));
        let summary = RecordSummary::from_record(&record);
        assert_eq!(summary.type_id, Some(4));
        assert_eq!(summary.status_id, Some(2));
        assert_eq!(summary.updater.as_deref(), Some("Dana"));
    }
}
