//! Retriever (§4E) — combines the structured, textual, and semantic layers
//! into a single ranked, record-level result set.
//!
//! Grounded on the teacher's hybrid search composition (`search.rs`'s RRF
//! fusion of semantic + FTS ranked lists), generalized from code-chunk
//! search over two ranked lists to a three-layer composition where the
//! structured and textual layers are SQL-level filters (not just another
//! ranked list to fuse) and semantic similarity supplies the final score.

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::embedder::{Embedder, EmbedderError};
use crate::query_parser::{ParsedQuery, QueryType};
use crate::record::RecordSummary;
use crate::store::{LogicalOperator, Store, StoreError, StructuredPredicate, TextPredicate};

#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embedder(#[from] EmbedderError),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("retrieval deadline exceeded")]
    TimedOut,
}

/// Which of a source record's fields a similar-by-id candidate shares
/// (§4E "similar" annotation).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchFlags {
    pub project: bool,
    pub type_id: bool,
    pub status_id: bool,
    pub updater: bool,
}

/// One record surfaced by retrieval, with its best-scoring chunk and full
/// summary (the Formatter needs summary columns beyond what a chunk's text
/// carries, e.g. for `summarize`'s grouped statistics).
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedRecord {
    pub record_id: String,
    pub raw_similarity: f32,
    pub boosted_score: f32,
    pub best_chunk_text: String,
    pub summary: RecordSummary,
    pub match_flags: Option<MatchFlags>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub records: Vec<RetrievedRecord>,
    /// Authoritative count of chunks matching the same predicates/threshold
    /// used for ranking (§4E "count queries use the same predicate and
    /// threshold logic as ranking queries").
    pub total_count: usize,
    /// Set when the strict/general/mixed filter yielded too few records and
    /// retrieval fell back to unfiltered top-k semantic ranking (§4E
    /// "degraded fallback").
    pub degraded: bool,
}

pub struct Retriever<'a> {
    store: &'a Store,
    embedder: &'a Embedder,
    config: &'a Config,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a Store, embedder: &'a Embedder, config: &'a Config) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Standard retrieval path (§4E steps 1-7): build predicates from the
    /// parsed query's entities, pick a threshold by entity-composition
    /// class, rank semantically within that filter, boost by target-field
    /// match, roll up to one best chunk per record, and fall back to
    /// unfiltered semantic ranking if too few records survive.
    pub fn retrieve(
        &self,
        parsed: &ParsedQuery,
        k: usize,
        deadline: Option<Instant>,
    ) -> Result<RetrievalResult, RetrieverError> {
        check_deadline(deadline)?;

        let structured = structured_predicates(parsed);
        let textual = textual_predicates(parsed);
        let threshold = select_threshold(&structured, &textual, self.config);
        let k_eff = if parsed.query_type == QueryType::Summarize {
            self.config.retrieval().k_summary
        } else {
            k
        };

        let query_vector = self.embedder.embed_query(&parsed.original_text)?;
        let vector = query_vector.as_slice();

        let mut total_count =
            self.store
                .count_matching(vector, &structured, &textual, parsed.operator, threshold)?;

        check_deadline(deadline)?;

        // Pool beyond k_eff so record-level rollup (many chunks -> one
        // record) still surfaces k_eff distinct records.
        let pool_k = k_eff.saturating_mul(8).max(100);
        let chunks = self
            .store
            .query(vector, pool_k, &structured, &textual, parsed.operator, threshold)?;

        let mut records = self.roll_up(chunks, parsed, k_eff)?;
        let mut degraded = false;

        if records.len() < self.config.retrieval().min_records_for_strict
            && (!structured.is_empty() || !textual.is_empty())
        {
            let fallback_chunks =
                self.store.query(vector, k_eff, &[], &[], LogicalOperator::And, 0.0)?;
            records = self.roll_up(fallback_chunks, parsed, k_eff)?;
            // The strict-filtered total_count (by construction < min_records_for_strict)
            // no longer describes the population `records` was drawn from once we've
            // fallen back to unfiltered ranking; recompute it against the same
            // (no predicates, threshold 0.0) query so §8 invariant 1 ("records
            // returned <= total_count") still holds.
            total_count = self.store.count_matching(vector, &[], &[], LogicalOperator::And, 0.0)?;
            degraded = true;
        }

        Ok(RetrievalResult {
            records,
            total_count,
            degraded,
        })
    }

    /// `similar(request_id)` path (§4E): uses the source record's primary
    /// chunk embedding as the query vector, applies the configured
    /// `similar_floor`, and never returns the source record itself.
    pub fn retrieve_similar(
        &self,
        request_id: &str,
        k: usize,
        deadline: Option<Instant>,
    ) -> Result<RetrievalResult, RetrieverError> {
        check_deadline(deadline)?;

        let source_summary = self
            .store
            .get_record_summary(request_id)?
            .ok_or_else(|| RetrieverError::RecordNotFound(request_id.to_string()))?;

        let source_embeddings = self.store.chunk_embeddings_for_record(request_id)?;
        let Some(vector) = source_embeddings.first() else {
            return Ok(RetrievalResult {
                records: Vec::new(),
                total_count: 0,
                degraded: false,
            });
        };

        check_deadline(deadline)?;

        let floor = self.config.retrieval().similar_floor;
        // +1 buffer since the source record itself will usually be the
        // top match and gets filtered out below.
        let chunks = self
            .store
            .query(vector, k + 1, &[], &[], LogicalOperator::And, floor)?;

        let mut best_per_record: std::collections::HashMap<String, crate::store::ChunkMatch> =
            std::collections::HashMap::new();
        for chunk in chunks {
            if chunk.record_id == request_id {
                continue;
            }
            best_per_record
                .entry(chunk.record_id.clone())
                .and_modify(|existing| {
                    if chunk.raw_similarity > existing.raw_similarity {
                        *existing = chunk.clone();
                    }
                })
                .or_insert(chunk);
        }

        let mut ranked: Vec<crate::store::ChunkMatch> = best_per_record.into_values().collect();
        ranked.sort_by(|a, b| {
            b.raw_similarity
                .partial_cmp(&a.raw_similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        ranked.truncate(k);

        let mut records = Vec::with_capacity(ranked.len());
        for chunk in ranked {
            let summary = self
                .store
                .get_record_summary(&chunk.record_id)?
                .unwrap_or_default();
            let match_flags = MatchFlags {
                project: fields_match(&source_summary.project, &summary.project),
                type_id: source_summary.type_id.is_some() && source_summary.type_id == summary.type_id,
                status_id: source_summary.status_id.is_some()
                    && source_summary.status_id == summary.status_id,
                updater: fields_match(&source_summary.updater, &summary.updater),
            };
            records.push(RetrievedRecord {
                record_id: chunk.record_id,
                raw_similarity: chunk.raw_similarity,
                boosted_score: chunk.raw_similarity,
                best_chunk_text: chunk.text,
                summary,
                match_flags: Some(match_flags),
            });
        }

        Ok(RetrievalResult {
            total_count: records.len(),
            records,
            degraded: false,
        })
    }

    fn roll_up(
        &self,
        chunks: Vec<crate::store::ChunkMatch>,
        parsed: &ParsedQuery,
        k: usize,
    ) -> Result<Vec<RetrievedRecord>, RetrieverError> {
        let mut best_per_record: std::collections::HashMap<String, (crate::store::ChunkMatch, f32)> =
            std::collections::HashMap::new();

        for chunk in chunks {
            let boost = boost_factor(&chunk.text, parsed, self.config);
            let boosted = chunk.raw_similarity * boost;
            best_per_record
                .entry(chunk.record_id.clone())
                .and_modify(|(existing, existing_boosted)| {
                    if boosted > *existing_boosted {
                        *existing = chunk.clone();
                        *existing_boosted = boosted;
                    }
                })
                .or_insert((chunk, boosted));
        }

        let mut ranked: Vec<(crate::store::ChunkMatch, f32)> = best_per_record.into_values().collect();
        ranked.sort_by(|(a_chunk, a_score), (b_chunk, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_chunk.raw_similarity.partial_cmp(&b_chunk.raw_similarity).unwrap_or(std::cmp::Ordering::Equal).reverse())
                .then_with(|| a_chunk.record_id.cmp(&b_chunk.record_id))
        });
        ranked.truncate(k);

        let mut records = Vec::with_capacity(ranked.len());
        for (chunk, boosted_score) in ranked {
            let summary = self
                .store
                .get_record_summary(&chunk.record_id)?
                .unwrap_or_default();
            records.push(RetrievedRecord {
                record_id: chunk.record_id,
                raw_similarity: chunk.raw_similarity,
                boosted_score,
                best_chunk_text: chunk.text,
                summary,
                match_flags: None,
            });
        }
        Ok(records)
    }
}

fn fields_match(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), RetrieverError> {
    if let Some(d) = deadline {
        if Instant::now() > d {
            return Err(RetrieverError::TimedOut);
        }
    }
    Ok(())
}

fn structured_predicates(parsed: &ParsedQuery) -> Vec<StructuredPredicate> {
    let mut preds = Vec::new();
    if let Some(id) = parsed.entities.type_id {
        preds.push(StructuredPredicate::TypeId(id));
    }
    if let Some(id) = parsed.entities.status_id {
        preds.push(StructuredPredicate::StatusId(id));
    }
    if let Some(range) = &parsed.entities.date_range {
        preds.push(StructuredPredicate::DateRange {
            from: range.from.clone(),
            to: range.to.clone(),
        });
    }
    if let Some(urgent) = parsed.entities.urgent {
        preds.push(StructuredPredicate::Urgent(urgent));
    }
    preds
}

fn textual_predicates(parsed: &ParsedQuery) -> Vec<TextPredicate> {
    let mut preds = Vec::new();
    if let Some(name) = &parsed.entities.person_name {
        preds.push(TextPredicate::PersonName(name.clone()));
    }
    if let Some(name) = &parsed.entities.project_name {
        preds.push(TextPredicate::ProjectName(name.clone()));
    }
    preds
}

/// Threshold selection (§4E): mixed (structured + textual both present) is
/// lowest since the structured filter already narrows the pool; a single
/// textual entity with no structured filter is strictest; structured-only
/// queries (pure type/status/date) ignore the threshold entirely since the
/// SQL predicate already enforces precision and the count/rank population
/// must match a direct SQL filter on that predicate (§4E, §8 round-trip
/// law); anything else (pure semantic, no entities at all) uses the general
/// threshold.
fn select_threshold(
    structured: &[StructuredPredicate],
    textual: &[TextPredicate],
    config: &Config,
) -> f32 {
    if !structured.is_empty() && !textual.is_empty() {
        config.retrieval().threshold_mixed
    } else if textual.len() == 1 && structured.is_empty() {
        config.retrieval().threshold_strict
    } else if !structured.is_empty() {
        0.0
    } else {
        config.retrieval().threshold_general
    }
}

/// Boost a chunk's raw similarity by where its matched entity text appears:
/// inside one of the intent's target-field labels (x `boost_target_field`),
/// anywhere else in the chunk (x `boost_anywhere`), or not at all (x
/// `boost_none`) (§4E).
fn boost_factor(chunk_text: &str, parsed: &ParsedQuery, config: &Config) -> f32 {
    let textual = textual_predicates(parsed);
    if textual.is_empty() {
        return config.retrieval().boost_none;
    }

    let target_labels: Vec<&str> = parsed
        .target_fields
        .iter()
        .filter_map(|tf| field_name_for_target(*tf))
        .filter_map(|name| config.fields.iter().find(|f| f.name == name))
        .map(|f| f.label.as_str())
        .collect();

    let mut any_match = false;
    for predicate in &textual {
        if !predicate.matches_text(chunk_text) {
            continue;
        }
        any_match = true;
        for segment in chunk_text.split(" | ") {
            if target_labels.iter().any(|label| segment.starts_with(label)) && predicate.matches_text(segment) {
                return config.retrieval().boost_target_field;
            }
        }
    }
    if any_match {
        config.retrieval().boost_anywhere
    } else {
        config.retrieval().boost_none
    }
}

fn field_name_for_target(tf: crate::query_parser::TargetField) -> Option<&'static str> {
    use crate::query_parser::TargetField::*;
    match tf {
        Updater => Some("updater"),
        Creator => Some("creator"),
        ResponsibleEmployee => Some("responsible_employee"),
        ContactEmail => Some("contact_email"),
        Project => Some("project"),
        TypeId => Some("type_id"),
        StatusId => Some("status_id"),
        StatusDate => Some("status_date"),
        CombinedText => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_parser::{DateRange, Entities, Intent};

    fn base_parsed() -> ParsedQuery {
        ParsedQuery {
            intent: Intent::General,
            entities: Entities::default(),
            query_type: QueryType::Find,
            target_fields: vec![],
            operator: LogicalOperator::And,
            original_text: "test".into(),
        }
    }

    #[test]
    fn threshold_mixed_when_structured_and_textual_present() {
        let config = Config::default();
        let structured = vec![StructuredPredicate::TypeId(4)];
        let textual = vec![TextPredicate::PersonName("Dana".into())];
        assert_eq!(
            select_threshold(&structured, &textual, &config),
            config.retrieval().threshold_mixed
        );
    }

    #[test]
    fn threshold_strict_for_single_textual_entity() {
        let config = Config::default();
        let textual = vec![TextPredicate::PersonName("Dana".into())];
        assert_eq!(
            select_threshold(&[], &textual, &config),
            config.retrieval().threshold_strict
        );
    }

    #[test]
    fn threshold_general_otherwise() {
        let config = Config::default();
        assert_eq!(select_threshold(&[], &[], &config), config.retrieval().threshold_general);
    }

    #[test]
    fn threshold_ignored_for_structured_only_query() {
        let config = Config::default();
        let structured = vec![StructuredPredicate::TypeId(4)];
        assert_eq!(select_threshold(&structured, &[], &config), 0.0);
    }

    #[test]
    fn boost_none_when_no_textual_entities() {
        let config = Config::default();
        let parsed = base_parsed();
        assert_eq!(boost_factor("Project: Atlas", &parsed, &config), config.retrieval().boost_none);
    }

    #[test]
    fn boost_target_field_when_match_in_labeled_segment() {
        let mut config = Config::default();
        config.fields = crate::config::Config::default_built_in().fields;
        let mut parsed = base_parsed();
        parsed.entities.person_name = Some("דנה".into());
        parsed.target_fields = vec![crate::query_parser::TargetField::Updater];
        let chunk_text = "עודכן על ידי: דנה | פרויקט: אטלס";
        assert_eq!(
            boost_factor(chunk_text, &parsed, &config),
            config.retrieval().boost_target_field
        );
    }

    #[test]
    fn boost_anywhere_when_match_outside_target_field() {
        let mut config = Config::default();
        config.fields = crate::config::Config::default_built_in().fields;
        let mut parsed = base_parsed();
        parsed.entities.person_name = Some("דנה".into());
        parsed.target_fields = vec![crate::query_parser::TargetField::Updater];
        let chunk_text = "הערות: טיפל בנושא דנה | פרויקט: אטלס";
        assert_eq!(boost_factor(chunk_text, &parsed, &config), config.retrieval().boost_anywhere);
    }

    #[test]
    fn date_range_becomes_structured_predicate() {
        let mut parsed = base_parsed();
        parsed.entities.date_range = Some(DateRange {
            from: Some("2026-01-01".into()),
            to: Some("2026-02-01".into()),
        });
        let preds = structured_predicates(&parsed);
        assert_eq!(preds.len(), 1);
        assert!(matches!(preds[0], StructuredPredicate::DateRange { .. }));
    }
}
