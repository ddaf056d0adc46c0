//! `reqragctl doctor` — diagnostic checks on model, hardware, and store health.

use anyhow::Result;
use colored::Colorize;

use reqrag::config::Config;
use reqrag::embedder::{Embedder, ModelSpec};
use reqrag::store::Store;

use crate::cli::{find_project_root, Cli};

/// Run diagnostic checks on the reqrag installation and store.
pub(crate) fn cmd_doctor(cli: &Cli) -> Result<()> {
    let root = find_project_root();
    let config = Config::load(&root);
    let store_path = cli.store_path();

    println!("Model:");
    let spec = ModelSpec {
        repo: config.model().embedding_model.clone(),
        dimensions: config.model().dimensions as usize,
        ..ModelSpec::default()
    };
    match Embedder::new(&spec) {
        Ok(embedder) => {
            println!("  {} Model: {}", "[✓]".green(), spec.repo);
            println!("  {} Tokenizer: loaded", "[✓]".green());
            println!("  {} Execution: {}", "[✓]".green(), embedder.provider());

            let start = std::time::Instant::now();
            match embedder.warm() {
                Ok(()) => println!("  {} Test embedding: {:?}", "[✓]".green(), start.elapsed()),
                Err(e) => println!("  {} Test embedding: {}", "[✗]".red(), e),
            }
        }
        Err(e) => {
            println!("  {} Model: {}", "[✗]".red(), e);
        }
    }

    println!();
    println!("Parser:");
    match config.parser {
        Some(ref parser) => {
            println!("  {} Cue-phrase config loaded", "[✓]".green());
            println!(
                "  {} {} intent categories, {} stop tokens",
                "[✓]".green(),
                parser.intents.len(),
                parser.stop_tokens.len()
            );
        }
        None => println!("  {} No parser config (query parsing will use defaults)", "[!]".yellow()),
    }

    println!();
    println!("Store:");
    if store_path.exists() {
        match Store::open(&store_path) {
            Ok(store) => {
                let stats = store.stats()?;
                println!("  {} Location: {}", "[✓]".green(), store_path.display());
                println!("  {} Schema version: {}", "[✓]".green(), stats.schema_version);
                println!(
                    "  {} {} records, {} chunks indexed",
                    "[✓]".green(),
                    stats.total_records,
                    stats.total_chunks
                );
                if let Some(model_name) = &stats.model_name {
                    if *model_name != spec.repo {
                        println!(
                            "  {} Store was built with '{}', configured model is '{}' — reindex needed",
                            "[!]".yellow(),
                            model_name,
                            spec.repo
                        );
                    }
                }
            }
            Err(e) => {
                println!("  {} Store: {}", "[✗]".red(), e);
            }
        }
    } else {
        println!("  {} Store: not created yet", "[!]".yellow());
        println!("      Run 'reqragctl init && reqragctl index <corpus-dir>' to create it.");
    }

    println!();
    println!("All checks complete.");

    Ok(())
}
