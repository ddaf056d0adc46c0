//! Structured and textual predicates for the Vector Store's ranking/counting
//! query (§4C `where_sql` / `text_predicates`).
//!
//! The contract names these as raw SQL fragments, but assembling SQL from
//! caller-supplied strings is exactly the LIKE-escaping correctness hazard
//! §9 warns about ("implementations must ensure that parameter binding does
//! not itself interpret `%`"). Expressing them as a closed predicate enum
//! that compiles to parameterized `sqlx` binds satisfies the same contract
//! (arbitrary structured/textual filtering, composed with the parsed
//! query's logical operator) while making injection structurally
//! impossible.

/// A structured predicate over an indexed `records` column (§4E "structured
/// layer"): `type_id`, `status_id`, or a date range.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredPredicate {
    TypeId(i64),
    StatusId(i64),
    DateRange {
        from: Option<String>,
        to: Option<String>,
    },
    Urgent(bool),
}

impl StructuredPredicate {
    /// SQL fragment (with `?` placeholders) and its bind values, in order.
    pub(crate) fn to_sql(&self) -> (&'static str, Vec<SqlValue>) {
        match self {
            StructuredPredicate::TypeId(id) => ("records.type_id = ?", vec![SqlValue::Int(*id)]),
            StructuredPredicate::StatusId(id) => {
                ("records.status_id = ?", vec![SqlValue::Int(*id)])
            }
            StructuredPredicate::Urgent(b) => {
                ("records.urgent = ?", vec![SqlValue::Int(if *b { 1 } else { 0 })])
            }
            StructuredPredicate::DateRange { from, to } => match (from, to) {
                (Some(f), Some(t)) => (
                    "records.status_date BETWEEN ? AND ?",
                    vec![SqlValue::Text(f.clone()), SqlValue::Text(t.clone())],
                ),
                (Some(f), None) => (
                    "records.status_date >= ?",
                    vec![SqlValue::Text(f.clone())],
                ),
                (None, Some(t)) => (
                    "records.status_date <= ?",
                    vec![SqlValue::Text(t.clone())],
                ),
                (None, None) => ("1=1", vec![]),
            },
        }
    }
}

/// A free-text predicate (§4E "textual layer"): a substring match over
/// record columns the intent targets (person-related fields, project name).
#[derive(Debug, Clone, PartialEq)]
pub enum TextPredicate {
    PersonName(String),
    ProjectName(String),
    /// Arbitrary substring over chunk text, for `general`-intent queries.
    ChunkText(String),
}

impl TextPredicate {
    pub(crate) fn to_sql(&self) -> (&'static str, Vec<SqlValue>) {
        let like = |s: &str| format!("%{}%", escape_like(s));
        match self {
            TextPredicate::PersonName(name) => (
                "(records.updater LIKE ? ESCAPE '\\' OR records.creator LIKE ? ESCAPE '\\' OR records.responsible_employee LIKE ? ESCAPE '\\')",
                vec![
                    SqlValue::Text(like(name)),
                    SqlValue::Text(like(name)),
                    SqlValue::Text(like(name)),
                ],
            ),
            TextPredicate::ProjectName(name) => (
                "records.project LIKE ? ESCAPE '\\'",
                vec![SqlValue::Text(like(name))],
            ),
            TextPredicate::ChunkText(needle) => (
                "chunks.text LIKE ? ESCAPE '\\'",
                vec![SqlValue::Text(like(needle))],
            ),
        }
    }

    /// Does `haystack` contain this predicate's literal needle? Used by the
    /// retriever's boosting pass (§4E), not by the SQL layer.
    pub fn matches_text(&self, haystack: &str) -> bool {
        let needle = match self {
            TextPredicate::PersonName(n) => n,
            TextPredicate::ProjectName(n) => n,
            TextPredicate::ChunkText(n) => n,
        };
        !needle.is_empty() && haystack.contains(needle.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum SqlValue {
    Int(i64),
    Text(String),
}

/// Escape SQLite LIKE metacharacters (`%`, `_`, and the escape char itself)
/// so a literal query fragment can't be misinterpreted as a wildcard.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Logical operator combining predicates (§4D, §4E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// Compose a WHERE clause (without the `WHERE` keyword) from structured and
/// textual predicates under the given operator. Returns `None` if there are
/// no predicates at all (unfiltered).
pub(crate) fn compose_where(
    structured: &[StructuredPredicate],
    textual: &[TextPredicate],
    operator: LogicalOperator,
) -> Option<(String, Vec<SqlValue>)> {
    let mut fragments = Vec::new();
    let mut binds = Vec::new();
    for p in structured {
        let (frag, vals) = p.to_sql();
        fragments.push(frag.to_string());
        binds.extend(vals);
    }
    for p in textual {
        let (frag, vals) = p.to_sql();
        fragments.push(frag.to_string());
        binds.extend(vals);
    }
    if fragments.is_empty() {
        return None;
    }
    let joiner = match operator {
        LogicalOperator::And => " AND ",
        LogicalOperator::Or => " OR ",
    };
    Some((format!("({})", fragments.join(joiner)), binds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escaping_neutralizes_wildcards() {
        assert_eq!(escape_like("50%_done"), "50\\%\\_done");
    }

    #[test]
    fn compose_where_and_joins_with_and() {
        let structured = vec![StructuredPredicate::TypeId(4)];
        let textual = vec![TextPredicate::PersonName("Dana".into())];
        let (sql, binds) = compose_where(&structured, &textual, LogicalOperator::And).unwrap();
        assert!(sql.contains(" AND "));
        assert_eq!(binds.len(), 1 + 3); // type_id + 3-way person OR
    }

    #[test]
    fn no_predicates_returns_none() {
        assert!(compose_where(&[], &[], LogicalOperator::And).is_none());
    }

    #[test]
    fn text_predicate_matches_literal_substring() {
        let p = TextPredicate::PersonName("Dana".into());
        assert!(p.matches_text("Updated By: Dana"));
        assert!(!p.matches_text("Updated By: Noam"));
    }
}
