//! `reqragctl query` — run a free-text query against the store via the
//! RAG Orchestrator (§4H), optionally generating a grounded answer.

use anyhow::{bail, Context, Result};

use reqrag::config::Config;
use reqrag::embedder::{Embedder, ModelSpec};
use reqrag::orchestrator::{Orchestrator, QueryOptions};
use reqrag::store::Store;

#[cfg(feature = "llm")]
use reqrag::generator::AnswerGenerator;

use crate::cli::{display, find_project_root, Cli};

pub(crate) fn cmd_query(cli: &Cli, text: &str) -> Result<()> {
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

    #[cfg(feature = "llm")]
    let generator = if cli.use_llm {
        let api_key = std::env::var("REQRAG_API_KEY").ok();
        Some(AnswerGenerator::new(
            std::env::var("REQRAG_LLM_ENDPOINT")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            api_key,
            config.model().generation_model.clone(),
            embedder.provider(),
        ))
    } else {
        None
    };

    #[cfg(feature = "llm")]
    let orchestrator = Orchestrator::new(&store, &embedder, &config, generator.as_ref());
    #[cfg(not(feature = "llm"))]
    let orchestrator = Orchestrator::new(&store, &embedder, &config, None);

    if cli.use_llm && cfg!(not(feature = "llm")) && !cli.quiet {
        eprintln!("warning: --use-llm requested but this build has no `llm` feature; returning retrieval context only");
    }

    let options = QueryOptions {
        top_k: cli.top_k,
        use_llm: cli.use_llm,
        deadline: cli.deadline(),
    };

    let result = orchestrator.query(text, options).context("Query failed")?;

    display::display_query_result(&result, cli.json)?;

    if result.records.is_empty() && result.total_count == 0 {
        std::process::exit(2);
    }

    Ok(())
}
