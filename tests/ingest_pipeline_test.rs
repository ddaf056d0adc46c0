//! End-to-end ingestion pipeline test: JSON/JSONL corpus on disk ->
//! `load_records_from_dir` -> `serialize_and_chunk` -> `Store::upsert`,
//! using synthetic (non-ML) embeddings so the pipeline can be exercised
//! without a network-fetched model.

use reqrag::config::Config;
use reqrag::ingest::load_records_from_dir;
use reqrag::serializer::serialize_and_chunk;
use reqrag::store::{ModelInfo, Store};

/// A cheap deterministic stand-in for a real embedding: every chunk gets the
/// same unit vector, which is enough to exercise storage/retrieval plumbing
/// without asserting anything about semantic similarity.
fn stub_embedding(dims: usize) -> Vec<f32> {
    let mut v = vec![0.0; dims];
    v[0] = 1.0;
    v
}

#[test]
fn a_mixed_json_and_jsonl_corpus_indexes_end_to_end() {
    let corpus = tempfile::tempdir().unwrap();
    std::fs::write(
        corpus.path().join("batch1.json"),
        r#"[
            {"requestid": "REQ-1", "project": "תשתיות צפון", "type_id": 4, "updater": "דנה כהן"},
            {"requestid": "REQ-2", "project": "גשר הירדן", "type_id": 9, "updater": "נועם לוי"}
        ]"#,
    )
    .unwrap();
    std::fs::write(
        corpus.path().join("batch2.jsonl"),
        "{\"requestid\": \"REQ-3\", \"project\": \"תשתיות צפון\", \"type_id\": 4, \"updater\": \"דנה כהן\"}\n",
    )
    .unwrap();

    let records = load_records_from_dir(corpus.path(), "requestid").unwrap();
    assert_eq!(records.len(), 3);

    let config = Config::default_built_in();
    let db_dir = tempfile::tempdir().unwrap();
    let store = Store::open(&db_dir.path().join("store.db")).unwrap();
    store.init(&ModelInfo { name: "stub".into(), dimensions: 4 }).unwrap();

    let mut total_chunks = 0usize;
    for record in &records {
        let chunks = serialize_and_chunk(record, &config);
        let pairs: Vec<_> = chunks.into_iter().map(|c| (c, stub_embedding(4))).collect();
        total_chunks += pairs.len();
        store.upsert(record, &pairs).unwrap();
    }

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.total_chunks as usize, total_chunks);

    let summary = store.get_record_summary("REQ-1").unwrap().expect("REQ-1 was indexed");
    assert_eq!(summary.project.as_deref(), Some("תשתיות צפון"));
    assert_eq!(summary.type_id, Some(4));
}

#[test]
fn reindexing_a_record_replaces_its_chunks_rather_than_appending() {
    let config = Config::default_built_in();
    let db_dir = tempfile::tempdir().unwrap();
    let store = Store::open(&db_dir.path().join("store.db")).unwrap();
    store.init(&ModelInfo { name: "stub".into(), dimensions: 4 }).unwrap();

    let corpus = tempfile::tempdir().unwrap();
    std::fs::write(
        corpus.path().join("r.json"),
        r#"{"requestid": "REQ-1", "project": "Alpha"}"#,
    )
    .unwrap();
    let records = load_records_from_dir(corpus.path(), "requestid").unwrap();
    let chunks = serialize_and_chunk(&records[0], &config);
    store
        .upsert(&records[0], &chunks.into_iter().map(|c| (c, stub_embedding(4))).collect::<Vec<_>>())
        .unwrap();

    // Re-ingest the same record id with different, longer content.
    std::fs::write(
        corpus.path().join("r.json"),
        r#"{"requestid": "REQ-1", "project": "Beta", "remarks": "updated remarks text"}"#,
    )
    .unwrap();
    let records = load_records_from_dir(corpus.path(), "requestid").unwrap();
    let chunks = serialize_and_chunk(&records[0], &config);
    let second_chunk_count = chunks.len();
    store
        .upsert(&records[0], &chunks.into_iter().map(|c| (c, stub_embedding(4))).collect::<Vec<_>>())
        .unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_records, 1);
    assert_eq!(
        stats.total_chunks as usize, second_chunk_count,
        "upsert must replace the prior generation's chunks, not append to them"
    );

    let summary = store.get_record_summary("REQ-1").unwrap().unwrap();
    assert_eq!(summary.project.as_deref(), Some("Beta"));
}
