//! Query documents and the record matcher.
//!
//! A query is record-shaped: its reserved controls (`record-operator`,
//! `record-skip`, `record-max-results`) steer combination and paging, and
//! every remaining key/value pair is a match clause. The compiled
//! [`RecordMatcher`] is also what the subscription fan-out evaluates, with
//! no paging involved.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys;
use crate::record::{Record, RecordValue};

/// How clauses combine across a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOperator {
    /// Every clause must match (the default).
    #[default]
    All,
    /// At least one clause must match.
    Any,
}

impl QueryOperator {
    /// Parses the wire form, `None` for anything but `all`/`any`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "any" => Some(Self::Any),
            _ => None,
        }
    }
}

/// Errors turning a query document into an executable [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryParseError {
    /// `record-operator` was present but not `all`/`any`.
    #[error("unknown operator `{0}`, expected `all` or `any`")]
    UnknownOperator(String),
    /// `record-skip` / `record-max-results` was not a non-negative integer.
    #[error("control `{key}` must be a non-negative integer, got `{value}`")]
    InvalidControl {
        /// The control key.
        key: String,
        /// The rejected raw value.
        value: String,
    },
    /// A clause value used a shape outside the wire model.
    #[error("clause `{0}` has an unrepresentable value")]
    UnrepresentableClause(String),
}

/// One compiled match clause: key plus the set of acceptable values.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    key: String,
    values: Vec<String>,
}

impl Clause {
    /// Clause semantics: the record's value set for this key must
    /// intersect the clause's value set. Absent keys never match.
    fn matches(&self, record: &Record) -> bool {
        record.get(&self.key).is_some_and(|value| {
            let record_values = value.as_strings();
            self.values.iter().any(|v| record_values.contains(v))
        })
    }
}

/// A compiled predicate over records: clauses plus combination operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMatcher {
    operator: QueryOperator,
    clauses: Vec<Clause>,
}

impl RecordMatcher {
    /// A matcher with no clauses, which matches every record.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            operator: QueryOperator::All,
            clauses: Vec::new(),
        }
    }

    /// Evaluates the matcher against one record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        match self.operator {
            QueryOperator::All => self.clauses.iter().all(|c| c.matches(record)),
            QueryOperator::Any => self.clauses.iter().any(|c| c.matches(record)),
        }
    }

    /// Number of compiled clauses.
    #[must_use]
    pub fn clause_count(&self) -> usize {
        self.clauses.len()
    }
}

/// An executable query: compiled matcher plus paging controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// The compiled predicate.
    pub matcher: RecordMatcher,
    /// Leading matches to drop.
    pub skip: usize,
    /// Result cap; `0` means unlimited.
    pub max_results: usize,
}

impl Query {
    /// A query matching everything, unpaged.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            matcher: RecordMatcher::match_all(),
            skip: 0,
            max_results: 0,
        }
    }

    /// Compiles a record-shaped query document.
    ///
    /// Reserved keys other than the three controls are kept as ordinary
    /// clauses so newer attributes remain queryable.
    ///
    /// # Errors
    ///
    /// Returns [`QueryParseError`] per the §4.3-style rules: unknown
    /// operator, non-integer skip/max-results.
    pub fn from_record(document: &Record) -> Result<Self, QueryParseError> {
        let mut operator = QueryOperator::default();
        let mut skip = 0_usize;
        let mut max_results = 0_usize;
        let mut clauses = Vec::new();

        for (key, value) in document.iter() {
            match key.as_str() {
                keys::RECORD_OPERATOR => {
                    let raw = value.as_scalar_str().unwrap_or_default();
                    operator = QueryOperator::parse(raw)
                        .ok_or_else(|| QueryParseError::UnknownOperator(raw.to_string()))?;
                }
                keys::RECORD_SKIP => skip = parse_control(key, value)?,
                keys::RECORD_MAX_RESULTS => max_results = parse_control(key, value)?,
                _ => clauses.push(Clause {
                    key: key.clone(),
                    values: value.as_strings(),
                }),
            }
        }

        Ok(Self {
            matcher: RecordMatcher {
                operator,
                clauses,
            },
            skip,
            max_results,
        })
    }

    /// Compiles decoded query-string pairs.
    ///
    /// Values containing commas split into lists; repeated keys merge
    /// into one clause.
    ///
    /// # Errors
    ///
    /// Same rules as [`Query::from_record`].
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, QueryParseError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut document = Record::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref();
            let mut incoming: Vec<String> = if value.contains(',') {
                value
                    .split(',')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            } else {
                vec![value.to_string()]
            };

            // A repeated key extends the existing clause's value set.
            if let Some(RecordValue::List(existing)) = document.get(key) {
                let mut merged = existing.clone();
                merged.append(&mut incoming);
                incoming = merged;
            } else if let Some(existing) = document.get(key).and_then(RecordValue::as_scalar_str) {
                let mut merged = vec![existing.to_string()];
                merged.append(&mut incoming);
                incoming = merged;
            }

            if incoming.len() == 1 && !value.contains(',') {
                document.set(key, incoming.remove(0));
            } else {
                document.set(key, incoming);
            }
        }
        Self::from_record(&document)
    }
}

/// Parses a skip/max-results control into a non-negative integer.
fn parse_control(key: &str, value: &RecordValue) -> Result<usize, QueryParseError> {
    let invalid = |raw: String| QueryParseError::InvalidControl {
        key: key.to_string(),
        value: raw,
    };

    match value {
        RecordValue::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid(n.to_string())),
        RecordValue::Text(_) | RecordValue::List(_) => {
            let raw = value.as_scalar_str().unwrap_or_default();
            raw.parse::<usize>().map_err(|_| invalid(raw.to_string()))
        }
        RecordValue::Bool(b) => Err(invalid(b.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> Record {
        Record::from_json(value).unwrap()
    }

    fn query(value: serde_json::Value) -> Query {
        Query::from_record(&record(value)).unwrap()
    }

    #[test]
    fn single_string_clause_matches_scalar_and_list() {
        let q = query(json!({"type": "service"}));
        assert!(q.matcher.matches(&record(json!({"type": "service"}))));
        assert!(q.matcher.matches(&record(json!({"type": ["service", "cache"]}))));
        assert!(!q.matcher.matches(&record(json!({"type": "host"}))));
        assert!(!q.matcher.matches(&record(json!({"loc": "east"}))));
    }

    #[test]
    fn list_clause_matches_on_any_intersection() {
        let q = query(json!({"loc": ["east", "west"]}));
        assert!(q.matcher.matches(&record(json!({"loc": ["west"]}))));
        assert!(q.matcher.matches(&record(json!({"loc": "east"}))));
        assert!(!q.matcher.matches(&record(json!({"loc": ["north"]}))));
    }

    #[test]
    fn operator_all_vs_any() {
        let a = record(json!({"type": ["service"], "loc": ["east"]}));
        let b = record(json!({"type": ["service"], "loc": ["west"]}));

        let all = query(json!({"type": "service", "loc": "east"}));
        assert!(all.matcher.matches(&a));
        assert!(!all.matcher.matches(&b));

        let any = query(json!({
            "type": "service",
            "loc": ["east", "west"],
            "record-operator": "any",
        }));
        assert!(any.matcher.matches(&a));
        assert!(any.matcher.matches(&b));
    }

    #[test]
    fn numbers_and_booleans_match_by_canonical_string() {
        let q = query(json!({"port": "8080", "enabled": "true"}));
        assert!(q
            .matcher
            .matches(&record(json!({"port": 8080, "enabled": true}))));
    }

    #[test]
    fn controls_parse_from_all_wire_shapes() {
        let q = query(json!({
            "record-skip": 2,
            "record-max-results": ["5"],
            "record-operator": "any",
        }));
        assert_eq!(q.skip, 2);
        assert_eq!(q.max_results, 5);
        assert_eq!(q.matcher.clause_count(), 0);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = Query::from_record(&record(json!({"record-operator": "none"}))).unwrap_err();
        assert_eq!(err, QueryParseError::UnknownOperator("none".into()));
    }

    #[test]
    fn non_integer_controls_are_rejected() {
        for bad in [json!({"record-skip": "two"}), json!({"record-skip": -1})] {
            assert!(matches!(
                Query::from_record(&record(bad)),
                Err(QueryParseError::InvalidControl { .. })
            ));
        }
    }

    #[test]
    fn unrecognized_reserved_keys_stay_clauses() {
        let q = query(json!({"record-shard": "7"}));
        assert_eq!(q.matcher.clause_count(), 1);
        assert!(q.matcher.matches(&record(json!({"record-shard": "7"}))));
        assert!(!q.matcher.matches(&record(json!({"type": "service"}))));
    }

    #[test]
    fn from_pairs_splits_commas_and_merges_repeats() {
        let q = Query::from_pairs([
            ("type", "service"),
            ("loc", "east,west"),
            ("record-operator", "any"),
        ])
        .unwrap();
        assert!(q.matcher.matches(&record(json!({"loc": ["west"]}))));

        let repeated = Query::from_pairs([("loc", "east"), ("loc", "west")]).unwrap();
        assert!(repeated.matcher.matches(&record(json!({"loc": "west"}))));
        assert!(repeated.matcher.matches(&record(json!({"loc": "east"}))));
    }

    #[test]
    fn from_pairs_rejects_bad_controls() {
        assert!(Query::from_pairs([("record-skip", "x")]).is_err());
        assert!(Query::from_pairs([("record-operator", "none")]).is_err());
    }

    proptest! {
        #[test]
        fn empty_query_matches_any_record(keys in proptest::collection::vec("[a-z-]{1,12}", 0..6)) {
            let mut rec = Record::new();
            for key in keys {
                rec.set(key, "value");
            }
            prop_assert!(Query::match_all().matcher.matches(&rec));
        }

        #[test]
        fn clause_on_own_value_always_matches(
            key in "[a-z-]{1,12}",
            value in "[a-zA-Z0-9._-]{1,16}",
        ) {
            let mut rec = Record::new();
            rec.set(key.clone(), value.clone());
            let mut doc = Record::new();
            doc.set(key, value);
            let q = Query::from_record(&doc).unwrap();
            prop_assert!(q.matcher.matches(&rec));
        }
    }
}
