//! # reqrag - Hebrew natural-language RAG engine over structured request records
//!
//! Turns free-text Hebrew questions about a corpus of structured "request"
//! records into grounded answers: a configuration-driven query parser
//! extracts intent/entities, a hybrid retriever combines structured SQL
//! predicates, textual matching, and semantic similarity, and an optional
//! answer generator produces a natural-language response grounded in the
//! retrieved context.
//!
//! ## Quick Start
//!
//! ```no_run
//! use reqrag::config::Config;
//! use reqrag::embedder::{Embedder, ModelSpec};
//! use reqrag::store::Store;
//! use reqrag::orchestrator::{Orchestrator, QueryOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load(std::path::Path::new("."));
//! let embedder = Embedder::new(&ModelSpec::default())?;
//! let store = Store::open(std::path::Path::new(".reqrag/index.db"))?;
//!
//! let orchestrator = Orchestrator::new(&store, &embedder, &config, None);
//! let result = orchestrator.query("כמה בקשות דחופות יש?", QueryOptions::default())?;
//! println!("{}", result.context);
//! # Ok(())
//! # }
//! ```

pub mod ann;
pub mod config;
pub mod embedder;
pub mod formatter;
#[cfg(feature = "llm")]
pub mod generator;
pub mod index;
pub mod ingest;
pub(crate) mod math;
pub mod orchestrator;
pub mod query_parser;
pub mod record;
pub mod retriever;
pub mod serializer;
pub mod store;

pub use embedder::{Embedder, Embedding};
pub use index::VectorIndex;
pub use orchestrator::{Orchestrator, OrchestratorResult, QueryOptions};
pub use query_parser::{parse, ParsedQuery};
pub use record::{FieldValue, Record};
pub use retriever::{RetrievalResult, Retriever};
pub use store::Store;
