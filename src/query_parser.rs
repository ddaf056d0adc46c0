//! Query Parser (§4D) — turns free-text Hebrew questions into a closed,
//! structured [`ParsedQuery`] using configured cue phrases rather than a
//! learned model, so the parsing vocabulary is hot-swappable via
//! [`crate::config::ParserConfig`] without recompiling.
//!
//! Parsing is total: every input, including the empty string or one that
//! matches no cue phrase at all, yields a `ParsedQuery` (defaulting to
//! `Intent::General` / `QueryType::Find`). There is no parse failure mode.

use serde::Serialize;

use crate::config::ParserConfig;
use crate::store::LogicalOperator;

/// The primary subject an entity extraction is anchored to (§4D "intent").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Intent {
    Person,
    Project,
    Type,
    Status,
    Date,
    Urgency,
    General,
}

/// The shape of answer the caller wants (§4D "query type", closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryType {
    Find,
    Count,
    Summarize,
    Similar,
    Urgent,
    AnswerRetrieval,
}

/// An inclusive date range as captured from the query text. Values are kept
/// as the opaque strings the query used them as written — the store
/// compares them lexicographically against `status_date`, so callers that
/// need calendar semantics should normalize upstream of ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Entities extracted from the query text (§3 "entity types"). Each field is
/// independently optional; a query can name several at once (e.g. person +
/// type), which the Retriever combines per [`LogicalOperator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Entities {
    pub person_name: Option<String>,
    pub project_name: Option<String>,
    pub type_id: Option<i64>,
    pub status_id: Option<i64>,
    pub date_range: Option<DateRange>,
    pub urgent: Option<bool>,
    pub request_id: Option<String>,
}

impl Entities {
    fn is_empty(&self) -> bool {
        self.person_name.is_none()
            && self.project_name.is_none()
            && self.type_id.is_none()
            && self.status_id.is_none()
            && self.date_range.is_none()
            && self.urgent.is_none()
            && self.request_id.is_none()
    }
}

/// A structured column or chunk-text location a boosting/targeting decision
/// can reference (§4D "target fields", §4E boosting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetField {
    Updater,
    Creator,
    ResponsibleEmployee,
    ContactEmail,
    Project,
    TypeId,
    StatusId,
    StatusDate,
    CombinedText,
}

/// The parser's total output: always present, never an error (§4D).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub intent: Intent,
    pub entities: Entities,
    pub query_type: QueryType,
    pub target_fields: Vec<TargetField>,
    pub operator: LogicalOperator,
    pub original_text: String,
}

/// Parse `text` against `config`'s cue-phrase/stop-token vocabulary. Never
/// fails; an unrecognized query comes back as `Intent::General` /
/// `QueryType::Find` with empty entities.
pub fn parse(text: &str, config: &ParserConfig) -> ParsedQuery {
    let trimmed = text.trim();
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();

    let query_type = classify_query_type(trimmed, &tokens, config);
    let operator = detect_operator(&tokens, config);

    let mut entities = Entities::default();
    entities.person_name = extract_cued_name(trimmed, &tokens, &config.person_cues, &config.stop_tokens)
        .or_else(|| extract_marker_prefixed_name(&tokens, config, Intent::Person));
    entities.project_name =
        extract_cued_name(trimmed, &tokens, &config.project_cues, &config.stop_tokens)
            .or_else(|| extract_marker_prefixed_name(&tokens, config, Intent::Project));
    entities.type_id = extract_cued_int(trimmed, &tokens, &config.type_cues);
    entities.status_id = extract_cued_int(trimmed, &tokens, &config.status_cues);
    entities.date_range = extract_date_range(trimmed, &tokens, config);
    if contains_any(trimmed, &config.urgent_keywords) {
        entities.urgent = Some(true);
    }
    if query_type == QueryType::Similar {
        entities.request_id = extract_cued_token(trimmed, &tokens, &config.similar_cues);
    }

    let intent = determine_intent(&entities, trimmed, config);
    let target_fields = target_fields_for(intent);

    ParsedQuery {
        intent,
        entities,
        query_type,
        target_fields,
        operator,
        original_text: trimmed.to_string(),
    }
}

/// Query-type keyword priority (§4D): `similar` (requires a request_id cue)
/// outranks `count`, which outranks `summarize`, which outranks `urgent`,
/// which outranks `answer_retrieval`; anything left is `find`.
fn classify_query_type(text: &str, tokens: &[&str], config: &ParserConfig) -> QueryType {
    if contains_any(text, &config.similar_cues) {
        return QueryType::Similar;
    }
    if contains_any(text, &config.count_keywords) {
        return QueryType::Count;
    }
    if contains_any(text, &config.summarize_keywords) {
        return QueryType::Summarize;
    }
    if contains_any(text, &config.urgent_keywords) {
        return QueryType::Urgent;
    }
    if contains_any(text, &config.answer_retrieval_keywords) {
        return QueryType::AnswerRetrieval;
    }
    let _ = tokens;
    QueryType::Find
}

/// Disjunction is explicit and must appear as a standalone token, not as a
/// substring of a longer word (§4D invariant 4: "a logical-operator marker
/// occurring as a substring of a name MUST NOT be interpreted as an
/// operator"). `AND` is the default when no marker is present.
fn detect_operator(tokens: &[&str], config: &ParserConfig) -> LogicalOperator {
    let is_marker = |tok: &str, markers: &[String]| markers.iter().any(|m| m == tok);
    if tokens.iter().any(|t| is_marker(t, &config.or_markers)) {
        return LogicalOperator::Or;
    }
    LogicalOperator::And
}

fn contains_any(text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| !p.is_empty() && text.contains(p.as_str()))
}

/// Find the longest cue phrase from `cues` occurring in `text`, preferring
/// longer (more specific) matches over shorter prefixes of the same phrase
/// family (e.g. "מהסוג" over "מסוג").
fn find_longest_cue<'a>(text: &str, cues: &'a [String]) -> Option<&'a str> {
    cues.iter()
        .filter(|c| !c.is_empty() && text.contains(c.as_str()))
        .max_by_key(|c| c.len())
        .map(|s| s.as_str())
}

/// Capture the name following a cue phrase: tokens after the cue, up to the
/// first stop token (§4D invariant 2: stop-token list is authoritative and
/// MUST NOT be consumed as part of the name).
fn extract_cued_name(
    text: &str,
    tokens: &[&str],
    cues: &[String],
    stop_tokens: &[String],
) -> Option<String> {
    let cue = find_longest_cue(text, cues)?;
    let cue_tokens: Vec<&str> = cue.split_whitespace().collect();
    let start = find_token_sequence(tokens, &cue_tokens)? + cue_tokens.len();
    let mut end = start;
    while end < tokens.len() {
        let tok = tokens[end];
        if stop_tokens.iter().any(|st| st == tok || (!st.is_empty() && tok.starts_with(st.as_str()))) {
            break;
        }
        end += 1;
    }
    if end <= start {
        return None;
    }
    let captured = tokens[start..end].join(" ");
    Some(strip_relation_marker(&captured, &[]))
}

/// Capture a single opaque token after a cue phrase (used for request ids,
/// which are not names and should not be stop-token-truncated beyond their
/// own boundary).
fn extract_cued_token(text: &str, tokens: &[&str], cues: &[String]) -> Option<String> {
    let cue = find_longest_cue(text, cues)?;
    let cue_tokens: Vec<&str> = cue.split_whitespace().collect();
    let start = find_token_sequence(tokens, &cue_tokens)? + cue_tokens.len();
    tokens.get(start).map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
}

fn extract_cued_int(text: &str, tokens: &[&str], cues: &[String]) -> Option<i64> {
    let cue = find_longest_cue(text, cues)?;
    let cue_tokens: Vec<&str> = cue.split_whitespace().collect();
    let start = find_token_sequence(tokens, &cue_tokens)? + cue_tokens.len();
    tokens
        .get(start)
        .and_then(|t| t.chars().filter(|c| c.is_ascii_digit()).collect::<String>().parse().ok())
}

fn extract_date_range(text: &str, tokens: &[&str], _config: &ParserConfig) -> Option<DateRange> {
    let from = extract_cued_token(text, tokens, &["מתאריך".to_string()]);
    let to = extract_cued_token(text, tokens, &["עד תאריך".to_string()]);
    let exact = extract_cued_token(text, tokens, &["בתאריך".to_string()]);

    if from.is_none() && to.is_none() && exact.is_none() {
        return None;
    }
    if let Some(day) = exact {
        return Some(DateRange {
            from: Some(day.clone()),
            to: Some(day),
        });
    }
    Some(DateRange { from, to })
}

/// Fallback for the single-character relation-marker prefix form (§4D
/// invariant 3): a token that begins with a configured relation marker and
/// is at least 2 characters once stripped becomes a plausible name capture.
/// This is a known heuristic limitation, not a morphological analyzer — see
/// the Open Questions discussion in DESIGN.md.
fn extract_marker_prefixed_name(tokens: &[&str], config: &ParserConfig, intent: Intent) -> Option<String> {
    if !matches!(intent, Intent::Person | Intent::Project) {
        return None;
    }
    for tok in tokens {
        if config.stop_tokens.iter().any(|st| st == tok) {
            continue;
        }
        let stripped = strip_relation_marker(tok, &config.relation_markers);
        if stripped.len() != tok.len() && stripped.chars().count() >= 2 {
            return Some(stripped);
        }
    }
    None
}

fn strip_relation_marker(captured: &str, markers: &[char]) -> String {
    let mut chars = captured.chars();
    if let Some(first) = chars.next() {
        if markers.contains(&first) {
            let rest: String = chars.collect();
            if rest.chars().count() >= 2 {
                return rest;
            }
        }
    }
    captured.to_string()
}

fn find_token_sequence(tokens: &[&str], needle: &[&str]) -> Option<usize> {
    if needle.is_empty() || needle.len() > tokens.len() {
        return None;
    }
    (0..=tokens.len() - needle.len()).find(|&start| tokens[start..start + needle.len()] == *needle)
}

/// Primary intent: whichever entity-bearing cue actually matched, in a
/// fixed priority order; an explicit urgency keyword or no entity at all
/// falls through to `General`.
fn determine_intent(entities: &Entities, text: &str, config: &ParserConfig) -> Intent {
    if entities.person_name.is_some() {
        Intent::Person
    } else if entities.project_name.is_some() {
        Intent::Project
    } else if entities.type_id.is_some() {
        Intent::Type
    } else if entities.status_id.is_some() {
        Intent::Status
    } else if entities.date_range.is_some() {
        Intent::Date
    } else if contains_any(text, &config.urgent_keywords) {
        Intent::Urgency
    } else {
        Intent::General
    }
}

fn target_fields_for(intent: Intent) -> Vec<TargetField> {
    match intent {
        Intent::Person => vec![
            TargetField::Updater,
            TargetField::Creator,
            TargetField::ResponsibleEmployee,
            TargetField::ContactEmail,
        ],
        Intent::Project => vec![TargetField::Project],
        Intent::Type => vec![TargetField::TypeId],
        Intent::Status => vec![TargetField::StatusId],
        Intent::Date => vec![TargetField::StatusDate],
        Intent::Urgency => vec![TargetField::StatusDate, TargetField::CombinedText],
        Intent::General => vec![TargetField::CombinedText],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn parser_config() -> ParserConfig {
        Config::default_built_in().parser.expect("built-in config has a [parser] section")
    }

    #[test]
    fn parsing_is_total_for_empty_input() {
        let parsed = parse("", &parser_config());
        assert_eq!(parsed.intent, Intent::General);
        assert_eq!(parsed.query_type, QueryType::Find);
        assert!(parsed.entities.is_empty());
    }

    #[test]
    fn person_cue_extracts_name_and_sets_intent() {
        let parsed = parse("בקשות מאת דנה כהן", &parser_config());
        assert_eq!(parsed.intent, Intent::Person);
        assert_eq!(parsed.entities.person_name.as_deref(), Some("דנה כהן"));
    }

    #[test]
    fn person_name_capture_stops_before_type_cue() {
        let parsed = parse("בקשות מאת דנה מסוג 4", &parser_config());
        assert_eq!(parsed.entities.person_name.as_deref(), Some("דנה"));
        assert_eq!(parsed.entities.type_id, Some(4));
    }

    #[test]
    fn count_keyword_sets_query_type_count() {
        let parsed = parse("כמה בקשות מאת דנה", &parser_config());
        assert_eq!(parsed.query_type, QueryType::Count);
        assert_eq!(parsed.entities.person_name.as_deref(), Some("דנה"));
    }

    #[test]
    fn or_marker_as_standalone_token_sets_operator_or() {
        let parsed = parse("בקשות מסוג 4 או בסטטוס 2", &parser_config());
        assert_eq!(parsed.operator, LogicalOperator::Or);
    }

    #[test]
    fn or_substring_inside_a_name_does_not_trigger_operator() {
        // "אורית" contains the substring "אור" but not the standalone "או" token.
        let parsed = parse("בקשות מאת אורית", &parser_config());
        assert_eq!(parsed.operator, LogicalOperator::And);
    }

    #[test]
    fn similar_cue_extracts_request_id_and_query_type() {
        let parsed = parse("דומה ל REQ-42", &parser_config());
        assert_eq!(parsed.query_type, QueryType::Similar);
        assert_eq!(parsed.entities.request_id.as_deref(), Some("REQ-42"));
    }

    #[test]
    fn summarize_keyword_sets_query_type_and_general_intent() {
        let parsed = parse("תן לי סיכום של הבקשות", &parser_config());
        assert_eq!(parsed.query_type, QueryType::Summarize);
    }

    #[test]
    fn urgent_keyword_sets_urgency_intent_and_entity() {
        let parsed = parse("אילו בקשות דחופות", &parser_config());
        assert_eq!(parsed.query_type, QueryType::Urgent);
        assert_eq!(parsed.entities.urgent, Some(true));
    }

    #[test]
    fn project_cue_extracts_project_name() {
        let parsed = parse("בקשות בפרויקט תשתיות צפון", &parser_config());
        assert_eq!(parsed.intent, Intent::Project);
        assert_eq!(parsed.entities.project_name.as_deref(), Some("תשתיות צפון"));
    }

    #[test]
    fn target_fields_follow_intent() {
        let parsed = parse("בקשות בסטטוס 2", &parser_config());
        assert_eq!(parsed.intent, Intent::Status);
        assert_eq!(parsed.target_fields, vec![TargetField::StatusId]);
    }
}
