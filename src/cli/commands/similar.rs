//! `reqragctl similar` — find records similar to an already-indexed record
//! (§4E "similar-by-id" path), via the same Orchestrator entry point as
//! `query`, phrased as a `similar_cues`-triggered query.

use anyhow::{bail, Context, Result};

use reqrag::config::Config;
use reqrag::embedder::{Embedder, ModelSpec};
use reqrag::orchestrator::{Orchestrator, QueryOptions};
use reqrag::store::Store;

use crate::cli::{display, find_project_root, Cli};

pub(crate) fn cmd_similar(cli: &Cli, request_id: &str) -> Result<()> {
    let root = find_project_root();
    let config = Config::load(&root);
    let store_path = cli.store_path();

    if !store_path.exists() {
        bail!("Store not found. Run 'reqragctl init && reqragctl index <corpus-dir>' first.");
    }

    let store = Store::open(&store_path).context("Failed to open store")?;
    let spec = ModelSpec {
        repo: config.model().embedding_model.clone(),
        dimensions: config.model().dimensions as usize,
        ..ModelSpec::default()
    };
    let embedder = Embedder::new(&spec).context("Failed to initialize embedder")?;
    let orchestrator = Orchestrator::new(&store, &embedder, &config, None);

    let options = QueryOptions {
        top_k: cli.top_k,
        use_llm: false,
        deadline: cli.deadline(),
    };

    let query_text = format!("דומה ל {}", request_id);
    let result = orchestrator
        .query(&query_text, options)
        .context("Similarity lookup failed")?;

    display::display_query_result(&result, cli.json)?;

    if result.records.is_empty() && result.total_count == 0 {
        std::process::exit(2);
    }

    Ok(())
}
