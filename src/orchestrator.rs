//! RAG Orchestrator (§4H) — the single entry point tying the Query Parser,
//! Retriever, Context Formatter, and (optionally) Answer Generator together
//! into one `query()` call.
//!
//! Grounded on the teacher's top-level search-command dispatch (`cli/
//! commands/query.rs`'s parse-then-search-then-render pipeline), generalized
//! from "parse CLI flags, search, print" to the spec's parse -> retrieve ->
//! (count/summarize special-casing) -> format -> optionally generate flow,
//! with graceful LLM-unavailable degradation rather than a hard failure.

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::embedder::Embedder;
use crate::formatter;
#[cfg(feature = "llm")]
use crate::generator::{AnswerGenerator, GeneratorError};
use crate::query_parser::{self, ParsedQuery, QueryType};
use crate::retriever::{RetrievalResult, Retriever, RetrieverError};
use crate::store::Store;

/// Answer generator reference type. A no-op unit placeholder when the `llm`
/// feature is disabled, so `Orchestrator::new`'s signature doesn't change
/// across feature builds.
#[cfg(feature = "llm")]
pub type GeneratorRef<'a> = &'a AnswerGenerator;
#[cfg(not(feature = "llm"))]
pub type GeneratorRef<'a> = &'a ();

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("query text must not be empty")]
    EmptyQuery,
    #[error("top_k must be greater than zero")]
    InvalidTopK,
    #[error(transparent)]
    Retriever(#[from] RetrieverError),
}

/// Per-call knobs (§4H, §6): how many records to surface, whether to invoke
/// the generator, and an optional wall-clock deadline for the whole query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub use_llm: bool,
    pub deadline: Option<Instant>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 20,
            use_llm: false,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorResult {
    pub answer: Option<String>,
    pub context: String,
    pub records: Vec<crate::retriever::RetrievedRecord>,
    pub total_count: usize,
    pub parsed_query: ParsedQuery,
    /// Set when retrieval degraded to an unfiltered fallback, or when an
    /// LLM answer was requested but the model was unavailable.
    pub degraded: bool,
}

pub struct Orchestrator<'a> {
    store: &'a Store,
    embedder: &'a Embedder,
    config: &'a Config,
    generator: Option<GeneratorRef<'a>>,
}

fn validate(text: &str, top_k: usize) -> Result<(), OrchestratorError> {
    if text.trim().is_empty() {
        return Err(OrchestratorError::EmptyQuery);
    }
    if top_k == 0 {
        return Err(OrchestratorError::InvalidTopK);
    }
    Ok(())
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a Store,
        embedder: &'a Embedder,
        config: &'a Config,
        generator: Option<GeneratorRef<'a>>,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            generator,
        }
    }

    /// Execute a free-text query end to end (§4H):
    /// 1. Parse the query text.
    /// 2. Dispatch to the similar-by-id path, or the standard retrieval
    ///    path (re-running at `k_summary` for `summarize` queries — the
    ///    Retriever already does this internally).
    /// 3. Format the retrieved records into context text.
    /// 4. If the caller requested an LLM answer and one is configured,
    ///    generate it; a `ModelUnavailable` error degrades to returning the
    ///    formatted context without an answer rather than failing the query.
    pub fn query(&self, text: &str, options: QueryOptions) -> Result<OrchestratorResult, OrchestratorError> {
        validate(text, options.top_k)?;

        let parser_config = self
            .config
            .parser
            .clone()
            .unwrap_or_else(|| Config::default_built_in().parser.expect("built-in config has parser"));
        let parsed = query_parser::parse(text, &parser_config);

        let retriever = Retriever::new(self.store, self.embedder, self.config);
        let retrieval: RetrievalResult = if parsed.query_type == QueryType::Similar {
            match &parsed.entities.request_id {
                Some(id) => retriever.retrieve_similar(id, options.top_k, options.deadline)?,
                None => retriever.retrieve(&parsed, options.top_k, options.deadline)?,
            }
        } else {
            retriever.retrieve(&parsed, options.top_k, options.deadline)?
        };

        let context = formatter::format(&retrieval, &parsed, self.config);

        let mut degraded = retrieval.degraded;
        // A query that matches nothing still returns total_count = 0 and an
        // empty list without ever invoking the generator (§8 boundary
        // behaviors): there is no context to ground an answer in.
        let use_llm = options.use_llm && !retrieval.records.is_empty();
        #[cfg(feature = "llm")]
        let answer = if use_llm {
            match self.generator {
                Some(generator) => match generator.generate(&context, &parsed) {
                    Ok(answer) => Some(answer),
                    Err(GeneratorError::ModelUnavailable(reason)) => {
                        tracing::warn!(reason = %reason, "generation model unavailable, degrading to context only");
                        degraded = true;
                        None
                    }
                    Err(GeneratorError::GenerationFailed(reason)) => {
                        tracing::warn!(reason = %reason, "generation failed, degrading to context only");
                        degraded = true;
                        None
                    }
                },
                None => {
                    degraded = true;
                    None
                }
            }
        } else {
            None
        };
        #[cfg(not(feature = "llm"))]
        let answer: Option<String> = {
            if use_llm {
                tracing::warn!("LLM answer requested but crate was built without the `llm` feature");
                degraded = true;
            }
            None
        };

        Ok(OrchestratorResult {
            answer,
            context,
            total_count: retrieval.total_count,
            records: retrieval.records,
            parsed_query: parsed,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Full end-to-end `query()` runs require a live Embedder, which
    // downloads a model from HuggingFace Hub on construction — not
    // exercised here. `validate` covers everything `query()` can reject
    // before touching the embedder or store.

    #[test]
    fn empty_query_text_is_rejected() {
        assert!(matches!(validate("   ", 20), Err(OrchestratorError::EmptyQuery)));
    }

    #[test]
    fn whitespace_only_query_text_is_rejected() {
        assert!(matches!(validate("\n\t  ", 20), Err(OrchestratorError::EmptyQuery)));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(matches!(validate("כמה בקשות", 0), Err(OrchestratorError::InvalidTopK)));
    }

    #[test]
    fn non_empty_query_with_positive_top_k_is_accepted() {
        assert!(validate("כמה בקשות", 20).is_ok());
    }

    #[test]
    fn default_options_are_conservative() {
        let options = QueryOptions::default();
        assert_eq!(options.top_k, 20);
        assert!(!options.use_llm);
        assert!(options.deadline.is_none());
    }
}
