//! Field Serializer (§4A) — weighted field concatenation and chunking.
//!
//! Mirrors the teacher's natural-language chunk-description assembly
//! (weighted token concatenation, deterministic ordering) generalized from
//! code-symbol description to tiered record-field serialization, and the
//! teacher's `extract_chunk` id/metadata/hash shape generalized from a
//! tree-sitter AST node to a record-derived text span.

use crate::config::{Config, FieldSpec, FieldTier};
use crate::record::{FieldValue, Record};
use serde_json::json;
use std::collections::BTreeMap;

const SEPARATOR: &str = " | ";

/// A single serialized-and-chunked unit ready for embedding (§3 Chunk).
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedChunk {
    pub record_id: String,
    pub chunk_index: u32,
    pub text: String,
    /// JSON metadata: char offsets within the serialized document (§0 ambient
    /// addition) plus the record's primary key for debugging.
    pub metadata: serde_json::Value,
}

/// Tolerant field-name matching (§4A): exact, then case-insensitive, then
/// BOM-stripped with `_`/`-` collapsed to a common normal form.
pub fn find_field<'a>(
    fields: &'a BTreeMap<String, FieldValue>,
    configured_name: &str,
) -> Option<&'a FieldValue> {
    if let Some(v) = fields.get(configured_name) {
        return Some(v);
    }
    let target_lower = configured_name.to_lowercase();
    if let Some((_, v)) = fields.iter().find(|(k, _)| k.to_lowercase() == target_lower) {
        return Some(v);
    }
    let normalize = |s: &str| -> String {
        s.trim_start_matches('\u{feff}')
            .to_lowercase()
            .replace(['_', '-'], "")
    };
    let target_norm = normalize(configured_name);
    fields
        .iter()
        .find(|(k, _)| normalize(k) == target_norm)
        .map(|(_, v)| v)
}

/// Build the weighted, labeled document for a record (without chunking).
///
/// Returns `None` if no configured field had a non-empty value — §4A's
/// "no serializable fields" edge case, reported by the caller as skipped,
/// not as an error.
pub fn serialize_record(record: &Record, fields: &[FieldSpec]) -> Option<String> {
    let mut tokens: Vec<String> = Vec::new();

    for spec in fields {
        let Some(value) = find_field(&record.fields, &spec.name) else {
            tracing::trace!(record_id = %record.record_id, field = %spec.name, "field absent, skipping");
            continue;
        };
        if value.is_empty() {
            tracing::trace!(record_id = %record.record_id, field = %spec.name, "field empty, skipping");
            continue;
        }
        let token = format!("{}: {}", spec.label, value.to_display_string());
        for _ in 0..spec.tier.repeat_count() {
            tokens.push(token.clone());
        }
    }

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(SEPARATOR))
    }
}

/// Number of chunks a document of length `len` yields under `chunk_size`/
/// `chunk_overlap` (§4A chunking formula).
pub fn chunk_count(len: usize, chunk_size: usize, chunk_overlap: usize) -> usize {
    if len <= chunk_size {
        return 1;
    }
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let numerator = len.saturating_sub(chunk_overlap);
    numerator.div_ceil(step).max(1)
}

/// Serialize and chunk a record per the configured field tiers (§4A).
///
/// Returns an empty vec for a record with no serializable fields — the
/// caller is responsible for counting/reporting that as a skip, not a
/// failure.
pub fn serialize_and_chunk(record: &Record, config: &Config) -> Vec<SerializedChunk> {
    let Some(doc) = serialize_record(record, &config.fields) else {
        return Vec::new();
    };

    let chunk_size = config.chunk_size();
    let chunk_overlap = config.chunk_overlap();

    let chars: Vec<char> = doc.chars().collect();
    if chars.len() <= chunk_size {
        return vec![SerializedChunk {
            record_id: record.record_id.clone(),
            chunk_index: 0,
            text: doc.clone(),
            metadata: json!({
                "record_id": record.record_id,
                "char_start": 0,
                "char_end": chars.len(),
            }),
        }];
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut idx = 0u32;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        chunks.push(SerializedChunk {
            record_id: record.record_id.clone(),
            chunk_index: idx,
            text,
            metadata: json!({
                "record_id": record.record_id,
                "char_start": start,
                "char_end": end,
            }),
        });
        idx += 1;
        if end >= chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec {
                name: "project".into(),
                label: "Project".into(),
                tier: FieldTier::Critical,
            },
            FieldSpec {
                name: "updater".into(),
                label: "Updated By".into(),
                tier: FieldTier::Important,
            },
            FieldSpec {
                name: "status_id".into(),
                label: "Status".into(),
                tier: FieldTier::Supporting,
            },
        ]
    }

    #[test]
    fn critical_field_repeats_three_times() {
        let record = Record::new("R1").with_field("project", FieldValue::Text("Atlas".into()));
        let doc = serialize_record(&record, &test_fields()).unwrap();
        assert_eq!(doc.matches("Project: Atlas").count(), 3);
    }

    #[test]
    fn missing_fields_skipped_not_errored() {
        let record = Record::new("R1");
        assert!(serialize_record(&record, &test_fields()).is_none());
    }

    #[test]
    fn empty_value_skipped() {
        let record = Record::new("R1").with_field("project", FieldValue::Text("   ".into()));
        assert!(serialize_record(&record, &test_fields()).is_none());
    }

    #[test]
    fn bool_renders_true_false() {
        let record = Record::new("R1").with_field(
            "urgent",
            FieldValue::Bool(true),
        );
        let fields = vec![FieldSpec {
            name: "urgent".into(),
            label: "Urgent".into(),
            tier: FieldTier::Auxiliary,
        }];
        let doc = serialize_record(&record, &fields).unwrap();
        assert_eq!(doc, "Urgent: true");
    }

    #[test]
    fn chunk_count_matches_formula() {
        assert_eq!(chunk_count(100, 512, 50), 1);
        assert_eq!(chunk_count(512, 512, 50), 1);
        assert_eq!(chunk_count(513, 512, 50), 2);
        // L=1000, size=512, overlap=50 -> step=462, ceil((1000-50)/462) = ceil(2.056) = 3
        assert_eq!(chunk_count(1000, 512, 50), 3);
    }

    #[test]
    fn chunking_produces_overlap_and_sequential_indices() {
        let mut config = Config::default();
        config.chunk_size = Some(20);
        config.chunk_overlap = Some(5);
        config.fields = test_fields();

        let record = Record::new("R1")
            .with_field("project", FieldValue::Text("Infrastructure Modernization".into()));
        let chunks = serialize_and_chunk(&record, &config);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
            assert_eq!(c.record_id, "R1");
        }
    }

    #[test]
    fn no_serializable_fields_yields_no_chunks() {
        let config = Config::default();
        let record = Record::new("R1");
        assert!(serialize_and_chunk(&record, &config).is_empty());
    }

    #[test]
    fn tolerant_field_matching() {
        let mut fields = BTreeMap::new();
        fields.insert("Status-ID".to_string(), FieldValue::Int(4));
        assert_eq!(find_field(&fields, "status_id"), Some(&FieldValue::Int(4)));
    }
}
