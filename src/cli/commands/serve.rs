//! `reqragctl serve` — expose `Orchestrator::query()` over a stdio
//! JSON-lines protocol for embedding in agent toolchains.
//!
//! Mirrors the teacher's query-command setup (`cli/commands/query.rs`:
//! load config, open store, build embedder and optional generator), but
//! loops reading one JSON request per stdin line instead of taking a
//! single CLI argument, writing one JSON response per stdout line.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use reqrag::config::Config;
use reqrag::embedder::{Embedder, ModelSpec};
use reqrag::orchestrator::{Orchestrator, OrchestratorResult, QueryOptions};
use reqrag::store::Store;

#[cfg(feature = "llm")]
use reqrag::generator::AnswerGenerator;

use crate::cli::{find_project_root, Cli};

/// Bound on how many queries the worker pool below runs at once. Small and
/// fixed rather than scaled to core count: retrieval is I/O- and
/// embedding-bound, not CPU-bound, so a handful of in-flight queries is
/// enough to hide latency without starving the embedder's own session lock.
const MAX_CONCURRENT_QUERIES: usize = 4;

#[derive(Deserialize)]
struct ServeRequest {
    query: String,
    /// Opaque caller-supplied correlation id, echoed back unchanged.
    /// Responses may arrive out of submission order since requests run
    /// concurrently across the worker pool.
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    use_llm: Option<bool>,
    #[serde(default)]
    deadline_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ServeResponse {
    Ok {
        id: Option<serde_json::Value>,
        #[serde(flatten)]
        result: Box<OrchestratorResult>,
    },
    Error {
        id: Option<serde_json::Value>,
        message: String,
    },
}

/// Read one JSON request per line from stdin, run it through the
/// Orchestrator on a small bounded worker pool, and write one JSON
/// response per line to stdout as each completes. A malformed line or a
/// failed query produces an `"error"` response rather than terminating
/// the session — one bad request shouldn't kill a long-lived agent
/// connection. Responses may complete out of submission order; callers
/// that care should set `id` on their requests and match it back.
pub(crate) fn cmd_serve(cli: &Cli) -> Result<()> {
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
    let generator = AnswerGenerator::new(
        std::env::var("REQRAG_LLM_ENDPOINT")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
        std::env::var("REQRAG_API_KEY").ok(),
        config.model().generation_model.clone(),
        embedder.provider(),
    );
    #[cfg(feature = "llm")]
    let orchestrator = Orchestrator::new(&store, &embedder, &config, Some(&generator));
    #[cfg(not(feature = "llm"))]
    let orchestrator = Orchestrator::new(&store, &embedder, &config, None);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(MAX_CONCURRENT_QUERIES)
        .build()
        .context("failed to build query worker pool")?;

    tracing::info!(
        store = %store_path.display(),
        workers = MAX_CONCURRENT_QUERIES,
        "serve: ready, reading requests from stdin",
    );

    let stdout = Mutex::new(std::io::stdout());
    let stdin = std::io::stdin();

    pool.scope(|scope| {
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "serve: failed to read a line from stdin, stopping");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let orchestrator = &orchestrator;
            let cli = &*cli;
            let stdout = &stdout;
            scope.spawn(move |_| {
                let response = handle_request(orchestrator, cli, &line);
                write_response(stdout, &response);
            });
        }
    });

    Ok(())
}

fn handle_request(orchestrator: &Orchestrator<'_>, cli: &Cli, line: &str) -> ServeResponse {
    let req: ServeRequest = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            return ServeResponse::Error {
                id: None,
                message: format!("invalid request: {e}"),
            }
        }
    };

    let options = QueryOptions {
        top_k: req.top_k.unwrap_or(cli.top_k),
        use_llm: req.use_llm.unwrap_or(cli.use_llm),
        deadline: req
            .deadline_ms
            .map(|ms| std::time::Instant::now() + std::time::Duration::from_millis(ms)),
    };

    match orchestrator.query(&req.query, options) {
        Ok(result) => ServeResponse::Ok {
            id: req.id,
            result: Box::new(result),
        },
        Err(e) => ServeResponse::Error {
            id: req.id,
            message: e.to_string(),
        },
    }
}

fn write_response(stdout: &Mutex<std::io::Stdout>, response: &ServeResponse) {
    let body = match serde_json::to_string(response) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "serve: failed to serialize response");
            return;
        }
    };
    let mut stdout = match stdout.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if writeln!(stdout, "{body}").is_ok() {
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_minimal_fields() {
        let req: ServeRequest = serde_json::from_str(r#"{"query": "כמה בקשות"}"#).unwrap();
        assert_eq!(req.query, "כמה בקשות");
        assert!(req.id.is_none());
        assert!(req.top_k.is_none());
        assert!(req.use_llm.is_none());
        assert!(req.deadline_ms.is_none());
    }

    #[test]
    fn request_parses_all_fields() {
        let req: ServeRequest = serde_json::from_str(
            r#"{"query": "q", "id": 7, "top_k": 5, "use_llm": true, "deadline_ms": 200}"#,
        )
        .unwrap();
        assert_eq!(req.id, Some(serde_json::json!(7)));
        assert_eq!(req.top_k, Some(5));
        assert_eq!(req.use_llm, Some(true));
        assert_eq!(req.deadline_ms, Some(200));
    }

    #[test]
    fn malformed_request_is_rejected() {
        let result = serde_json::from_str::<ServeRequest>("not json");
        assert!(result.is_err());
    }

    #[test]
    fn error_response_serializes_with_status_tag_and_echoes_id() {
        let response = ServeResponse::Error {
            id: Some(serde_json::json!("req-1")),
            message: "store not found".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""status":"error""#));
        assert!(json.contains("store not found"));
        assert!(json.contains(r#""id":"req-1""#));
    }
}
