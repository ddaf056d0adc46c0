//! Rendering [`OrchestratorResult`] to stdout, plain or JSON (§4F/§0).
//!
//! Mirrors the teacher's human/JSON dual rendering split (`cli/display.rs`'s
//! `display_unified_results` / `display_unified_results_json` pair),
//! generalized from a chunk result list to a query/similar result: an
//! optional generated answer, the formatted context, and the record list
//! behind it.

use anyhow::Result;

use reqrag::OrchestratorResult;

pub(crate) fn display_query_result(result: &OrchestratorResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if let Some(answer) = &result.answer {
        println!("{}", answer);
        println!();
        println!("---");
        println!();
    }

    print!("{}", result.context);

    if result.records.is_empty() && result.total_count == 0 {
        println!("(no matching records)");
    }

    if result.degraded {
        println!();
        println!("(note: retrieval degraded — see --verbose logs for why)");
    }

    Ok(())
}
