//! `reqragctl index` — ingest a directory of JSON/JSONL record files into
//! the store: load, serialize+chunk, embed, and upsert each record.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use reqrag::config::Config;
use reqrag::embedder::{Embedder, ModelSpec};
use reqrag::ingest::load_records_from_dir;
use reqrag::serializer::serialize_and_chunk;
use reqrag::store::{ModelInfo, Store};

use crate::cli::{acquire_index_lock, check_interrupted, find_project_root, signal, Cli};

/// Ingest a corpus directory into the store (§0 "build-index" half of the split).
pub(crate) fn cmd_index(cli: &Cli, corpus: &Path, primary_key: &str, force: bool) -> Result<()> {
    signal::reset_interrupted();
    let root = find_project_root();
    let store_path = cli.store_path();
    let reqrag_dir = store_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| root.join(".reqrag"));

    std::fs::create_dir_all(&reqrag_dir)
        .with_context(|| format!("Failed to create {}", reqrag_dir.display()))?;

    let _lock = acquire_index_lock(&reqrag_dir)?;

    let config = Config::load(&root);
    let spec = ModelSpec {
        repo: config.model().embedding_model.clone(),
        dimensions: config.model().dimensions as usize,
        ..ModelSpec::default()
    };
    let model_info = ModelInfo {
        name: spec.repo.clone(),
        dimensions: spec.dimensions as u32,
    };

    if force && store_path.exists() {
        std::fs::remove_file(&store_path)
            .with_context(|| format!("Failed to remove {}", store_path.display()))?;
    }

    let store = Store::open(&store_path)?;
    store.init(&model_info)?;
    store.check_compatibility(&model_info)?;

    if !cli.quiet {
        println!("Loading records from {}...", corpus.display());
    }
    let records = load_records_from_dir(corpus, primary_key)
        .with_context(|| format!("Failed to load records from {}", corpus.display()))?;

    if !cli.quiet {
        println!("Loaded {} records", records.len());
    }
    if records.is_empty() {
        return Ok(());
    }

    let embedder = Embedder::new(&spec).context("Failed to initialize embedder")?;

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(records.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let mut indexed = 0usize;
    let mut total_chunks = 0usize;
    for record in &records {
        if check_interrupted() {
            if !cli.quiet {
                println!("Interrupted; stopping after {} records.", indexed);
            }
            break;
        }

        let chunks = serialize_and_chunk(record, &config);
        if chunks.is_empty() {
            progress.inc(1);
            continue;
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embedder
            .embed_documents(&texts)
            .with_context(|| format!("Failed to embed record {}", record.record_id))?;

        let pairs: Vec<_> = chunks
            .into_iter()
            .zip(embeddings.into_iter().map(|e| e.into_inner()))
            .collect();

        store
            .upsert(record, &pairs)
            .with_context(|| format!("Failed to store record {}", record.record_id))?;

        indexed += 1;
        total_chunks += pairs.len();
        progress.inc(1);
    }
    progress.finish_and_clear();

    if !cli.quiet {
        println!("Index complete:");
        println!("  Records: {}", indexed);
        println!("  Chunks:  {}", total_chunks);
    }

    Ok(())
}
