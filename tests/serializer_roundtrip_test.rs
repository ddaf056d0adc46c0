//! Round-trip law: reindexing a record must yield at least one chunk whose
//! text contains every critical (x3) field's rendered value, regardless of
//! where the chunk boundary happens to fall for the rest of the document.

use reqrag::config::Config;
use reqrag::record::{FieldValue, Record};
use reqrag::serializer::serialize_and_chunk;

fn sample_record() -> Record {
    Record::new("REQ-1001")
        .with_field("project", FieldValue::Text("תשתיות צפון".into()))
        .with_field("remarks", FieldValue::Text("דורש אישור תקציבי נוסף".into()))
        .with_field("updater", FieldValue::Text("דנה כהן".into()))
        .with_field("type_id", FieldValue::Int(4))
        .with_field("status_id", FieldValue::Int(2))
        .with_field("urgent", FieldValue::Bool(true))
}

#[test]
fn every_critical_field_value_survives_into_some_chunk() {
    let config = Config::default_built_in();
    let record = sample_record();
    let chunks = serialize_and_chunk(&record, &config);
    assert!(!chunks.is_empty());

    let critical_fields: Vec<_> = config
        .fields
        .iter()
        .filter(|f| matches!(f.tier, reqrag::config::FieldTier::Critical))
        .collect();
    assert!(!critical_fields.is_empty(), "built-in config must declare at least one critical field");

    for field in critical_fields {
        if let Some(value) = record.get(&field.name) {
            let rendered = value.to_display_string();
            let appears_somewhere = chunks.iter().any(|c| c.text.contains(&rendered));
            assert!(
                appears_somewhere,
                "critical field '{}' value '{}' did not survive into any chunk",
                field.name, rendered
            );
        }
    }
}

#[test]
fn chunk_indices_are_sequential_and_contiguous() {
    let mut config = Config::default_built_in();
    config.chunk_size = Some(15);
    config.chunk_overlap = Some(3);

    let record = sample_record();
    let chunks = serialize_and_chunk(&record, &config);
    assert!(chunks.len() > 1, "a small chunk_size over this record should force multiple chunks");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as u32);
        assert_eq!(chunk.record_id, "REQ-1001");
    }
}

#[test]
fn chunk_count_formula_matches_the_actual_chunker_output() {
    let mut config = Config::default_built_in();
    config.chunk_size = Some(30);
    config.chunk_overlap = Some(5);

    let record = sample_record();
    let chunks = serialize_and_chunk(&record, &config);

    // The document's own length determines chunk_count's input, not a fixed
    // constant, so re-derive it from the same serialized document length.
    let doc = reqrag::serializer::serialize_record(&record, &config.fields).unwrap();
    let expected = reqrag::serializer::chunk_count(doc.chars().count(), 30, 5);
    assert_eq!(chunks.len(), expected);
}

#[test]
fn a_record_with_no_configured_fields_present_yields_no_chunks() {
    let config = Config::default_built_in();
    let record = Record::new("REQ-empty");
    assert!(serialize_and_chunk(&record, &config).is_empty());
}
