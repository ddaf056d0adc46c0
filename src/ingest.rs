//! Record ingestion (§0 ambient stack) — reads upstream records from disk
//! into [`Record`]s the Field Serializer can consume.
//!
//! Grounded on the teacher's `ignore::WalkBuilder`-based file enumeration
//! (`cli/files.rs`), generalized from walking a source tree for code files
//! to walking a directory of record JSON files; and on `serde_json`'s
//! already-declared role in the dependency stack for the heterogeneous
//! `FieldValue` map (§3).

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::record::{FieldValue, Record};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record in {path} has no '{key}' field to use as its primary key")]
    MissingPrimaryKey { path: String, key: String },
}

/// Load every record from a directory of upstream files (§0 "record
/// ingestion"). Accepts a mix of:
/// - `*.json` files containing either a single record object or an array
///   of record objects.
/// - `*.jsonl` files, one record object per line.
///
/// `primary_key` names the field used as each record's `record_id` (e.g.
/// `"requestid"`); a record missing it is reported via `IngestError`, not
/// silently skipped, since a record with no stable identity can't be
/// upserted idempotently.
pub fn load_records_from_dir(dir: &Path, primary_key: &str) -> Result<Vec<Record>, IngestError> {
    let mut records = Vec::new();

    for entry in ignore::WalkBuilder::new(dir).hidden(false).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "failed to walk ingestion directory entry");
                continue;
            }
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => records.extend(load_json_file(path, primary_key)?),
            Some("jsonl") => records.extend(load_jsonl_file(path, primary_key)?),
            _ => continue,
        }
    }

    tracing::info!(count = records.len(), dir = %dir.display(), "loaded records for ingestion");
    Ok(records)
}

fn load_json_file(path: &Path, primary_key: &str) -> Result<Vec<Record>, IngestError> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| IngestError::Json {
        path: path.display().to_string(),
        source: e,
    })?;

    let objects: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(items) => items,
        single @ serde_json::Value::Object(_) => vec![single],
        _ => Vec::new(),
    };

    objects
        .into_iter()
        .map(|obj| record_from_json(obj, path, primary_key))
        .collect()
}

fn load_jsonl_file(path: &Path, primary_key: &str) -> Result<Vec<Record>, IngestError> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).map_err(|e| IngestError::Json {
                path: path.display().to_string(),
                source: e,
            })?;
            record_from_json(value, path, primary_key)
        })
        .collect()
}

fn record_from_json(
    value: serde_json::Value,
    path: &Path,
    primary_key: &str,
) -> Result<Record, IngestError> {
    let serde_json::Value::Object(map) = value else {
        return Err(IngestError::MissingPrimaryKey {
            path: path.display().to_string(),
            key: primary_key.to_string(),
        });
    };

    let record_id = map
        .get(primary_key)
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|i| i.to_string())))
        .ok_or_else(|| IngestError::MissingPrimaryKey {
            path: path.display().to_string(),
            key: primary_key.to_string(),
        })?;

    let mut fields = BTreeMap::new();
    for (key, value) in map {
        if key == primary_key {
            continue;
        }
        fields.insert(key, field_value_from_json(value));
    }

    Ok(Record { record_id, fields })
}

fn field_value_from_json(value: serde_json::Value) -> FieldValue {
    match value {
        serde_json::Value::Null => FieldValue::Null,
        serde_json::Value::Bool(b) => FieldValue::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Int(i)
            } else {
                FieldValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => FieldValue::Text(s),
        other => FieldValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_array_of_records_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("records.json"),
            r#"[{"requestid": "R1", "project": "Atlas"}, {"requestid": "R2", "project": "Orion"}]"#,
        )
        .unwrap();
        let records = load_records_from_dir(dir.path(), "requestid").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_id, "R1");
    }

    #[test]
    fn loads_single_object_json_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r1.json"), r#"{"requestid": "R1", "project": "Atlas"}"#).unwrap();
        let records = load_records_from_dir(dir.path(), "requestid").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn loads_jsonl_file_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("records.jsonl"),
            "{\"requestid\": \"R1\"}\n{\"requestid\": \"R2\"}\n",
        )
        .unwrap();
        let records = load_records_from_dir(dir.path(), "requestid").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn missing_primary_key_is_reported_as_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), r#"{"project": "Atlas"}"#).unwrap();
        let err = load_records_from_dir(dir.path(), "requestid").unwrap_err();
        assert!(matches!(err, IngestError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn non_record_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a record").unwrap();
        let records = load_records_from_dir(dir.path(), "requestid").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn numeric_primary_key_is_stringified() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r.json"), r#"{"requestid": 42}"#).unwrap();
        let records = load_records_from_dir(dir.path(), "requestid").unwrap();
        assert_eq!(records[0].record_id, "42");
    }
}
