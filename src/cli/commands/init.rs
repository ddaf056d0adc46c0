//! `reqragctl init` — create the store directory and warm the embedder.

use anyhow::Context;
use anyhow::Result;

use reqrag::config::Config;
use reqrag::embedder::{Embedder, ModelSpec};

use crate::cli::{find_project_root, Cli};

/// Create `.reqrag/`, download the embedding model, and warm it up.
pub(crate) fn cmd_init(cli: &Cli) -> Result<()> {
    let root = find_project_root();
    let reqrag_dir = root.join(".reqrag");

    if !cli.quiet {
        println!("Initializing reqrag...");
    }

    std::fs::create_dir_all(&reqrag_dir).context("Failed to create .reqrag directory")?;

    let gitignore = reqrag_dir.join(".gitignore");
    std::fs::write(&gitignore, "store.db\nstore.db-wal\nstore.db-shm\nindex.lock\n")
        .context("Failed to create .gitignore")?;

    let config = Config::load(&root);
    let spec = ModelSpec {
        repo: config.model().embedding_model.clone(),
        dimensions: config.model().dimensions as usize,
        ..ModelSpec::default()
    };

    if !cli.quiet {
        println!("Downloading embedding model ({})...", spec.repo);
    }

    let embedder = Embedder::new(&spec).context("Failed to initialize embedder")?;

    if !cli.quiet {
        println!("Detected execution provider: {}", embedder.provider());
    }

    embedder.warm().context("Failed to warm embedder")?;

    if !cli.quiet {
        println!("Created .reqrag/");
        println!();
        println!("Run 'reqragctl index <corpus-dir>' to build the store.");
    }

    Ok(())
}
