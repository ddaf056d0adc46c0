//! CLI for `reqragctl`: index a corpus of request records, then query or
//! find-similar against the built store.
//!
//! Mirrors the teacher's `cli/mod.rs` shape (a `clap`-derive `Cli` with a
//! subcommand enum, plus a bare-query shorthand dispatched from `run_with`),
//! generalized to the spec's build-index/query-index split (§0).

mod commands;
mod config;
mod display;
mod files;
mod signal;

pub(crate) use config::find_project_root;
pub(crate) use files::acquire_index_lock;
pub(crate) use signal::check_interrupted;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{cmd_doctor, cmd_index, cmd_init, cmd_query, cmd_similar, cmd_stats};

#[derive(Parser)]
#[command(name = "reqragctl")]
#[command(about = "Hebrew request-record RAG engine: index, query, and inspect a local store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Query text (quote multi-word queries); shorthand for `reqragctl query`
    query: Option<String>,

    /// Number of records to return
    #[arg(short = 'n', long, default_value = "20")]
    top_k: usize,

    /// Generate a grounded answer via the configured LLM (requires the `llm` feature)
    #[arg(long)]
    use_llm: bool,

    /// Abort retrieval after this many milliseconds and return what's found so far
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Override the store path (default: `<project root>/.reqrag/store.db`)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Show debug info (sets RUST_LOG=debug)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store directory and download/warm the embedding model
    Init,
    /// Check model, hardware, and store health
    Doctor,
    /// Ingest a directory of JSON/JSONL request records into the store
    Index {
        /// Directory of `.json`/`.jsonl` record files
        corpus: PathBuf,
        /// Field name that uniquely identifies each record
        #[arg(long, default_value = "requestid")]
        primary_key: String,
        /// Rebuild the store from scratch instead of upserting
        #[arg(long)]
        force: bool,
    },
    /// Run a free-text query against the store
    Query {
        /// Query text (quote multi-word queries)
        text: String,
    },
    /// Find records similar to an already-indexed record
    Similar {
        /// The record's primary key
        request_id: String,
    },
    /// Show store statistics
    Stats,
    /// Expose `Orchestrator::query()` over a stdio JSON-lines protocol
    #[cfg(feature = "serve")]
    Serve,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Cli {
    fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| find_project_root().join(".reqrag").join("store.db"))
    }

    fn deadline(&self) -> Option<std::time::Instant> {
        self.deadline_ms
            .map(|ms| std::time::Instant::now() + std::time::Duration::from_millis(ms))
    }
}

/// Run the CLI with pre-parsed arguments (`main.rs` inspects `--verbose` first).
pub fn run_with(cli: Cli) -> Result<()> {
    signal::setup_signal_handler();

    match &cli.command {
        Some(Commands::Init) => cmd_init(&cli),
        Some(Commands::Doctor) => cmd_doctor(&cli),
        Some(Commands::Index {
            corpus,
            primary_key,
            force,
        }) => cmd_index(&cli, corpus, primary_key, *force),
        Some(Commands::Query { text }) => cmd_query(&cli, text),
        Some(Commands::Similar { request_id }) => cmd_similar(&cli, request_id),
        Some(Commands::Stats) => cmd_stats(&cli),
        #[cfg(feature = "serve")]
        Some(Commands::Serve) => commands::cmd_serve(&cli),
        Some(Commands::Completions { shell }) => {
            cmd_completions(*shell);
            Ok(())
        }
        None => match &cli.query {
            Some(q) => cmd_query(&cli, q),
            None => {
                println!("Usage: reqragctl <query> or reqragctl <command>");
                println!("Run 'reqragctl --help' for more information.");
                Ok(())
            }
        },
    }
}

fn cmd_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(shell, &mut Cli::command(), "reqragctl", &mut std::io::stdout());
}
