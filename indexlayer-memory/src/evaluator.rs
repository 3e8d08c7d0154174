//! Query DSL evaluation for in-memory search.
//!
//! This module evaluates the small subset of the store's query DSL the in-memory
//! backend understands (`match_all`, `term`, `terms`, `range` and `bool`) and
//! orders hits for the `sort` section.
//!
//! Fields are addressed with dotted paths (`author.name`). Like the remote store,
//! a field is multi-valued: arrays are flattened at every level, `null` counts as
//! missing, and a clause matches if any value of the field matches.

use serde_json::{Map, Value};
use std::{cmp::Ordering, collections::HashMap};

use indexlayer_core::error::{IndexStoreError, IndexStoreResult};

/// Type-erased, comparable representation of JSON values.
///
/// Numbers are normalized to f64 for comparison. Dates are compared as their
/// string form, which orders correctly for the normalized UTC representation.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => value
                .as_f64()
                .map(Comparable::Number)
                .unwrap_or(Comparable::Null),
            Value::String(value) => Comparable::String(value),
            Value::Array(items) => Comparable::Array(
                items
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Value::Object(map) => Comparable::Map(
                map
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            // The store parses query values against the field type, so "5" matches 5.
            (Comparable::String(a), Comparable::Number(b)) | (Comparable::Number(b), Comparable::String(a)) => {
                a.trim().parse::<f64>().is_ok_and(|a| a == *b)
            }
            (Comparable::String(a), Comparable::Bool(b)) | (Comparable::Bool(b), Comparable::String(a)) => {
                *a == if *b { "true" } else { "false" }
            }
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::Number(b)) => a.trim().parse::<f64>().ok()?.partial_cmp(b),
            (Comparable::Number(a), Comparable::String(b)) => a.partial_cmp(&b.trim().parse::<f64>().ok()?),
            _ => None,
        }
    }
}

/// Returns every value of a dotted field path, flattening arrays and skipping nulls.
pub(crate) fn field_values<'a>(document: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let mut values = Vec::new();
    collect_values(document, path, &mut values);
    values
}

fn collect_values<'a>(map: &'a Map<String, Value>, path: &str, out: &mut Vec<&'a Value>) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    if let Some(value) = map.get(head) {
        push_values(value, rest, out);
    }
}

fn push_values<'a>(value: &'a Value, rest: Option<&str>, out: &mut Vec<&'a Value>) {
    match (value, rest) {
        (Value::Null, _) => {}
        (Value::Array(items), _) => {
            for item in items {
                push_values(item, rest, out);
            }
        }
        (_, None) => out.push(value),
        (Value::Object(map), Some(rest)) => collect_values(map, rest, out),
        _ => {}
    }
}

/// Evaluates query clauses against a single document.
pub(crate) struct QueryEvaluator<'a> {
    document: &'a Map<String, Value>,
}

impl<'a> QueryEvaluator<'a> {
    pub fn new(document: &'a Map<String, Value>) -> Self {
        Self { document }
    }

    pub fn evaluate(&self, query: &Value) -> IndexStoreResult<bool> {
        let (kind, body) = single_entry(query, "query")?;

        match kind {
            "match_all" => Ok(true),
            "term" => self.visit_term(body),
            "terms" => self.visit_terms(body),
            "range" => self.visit_range(body),
            "bool" => self.visit_bool(body),
            other => Err(IndexStoreError::Backend(format!(
                "parsing_exception: unknown query [{}]",
                other
            ))),
        }
    }

    fn visit_term(&self, body: &Value) -> IndexStoreResult<bool> {
        let (field, clause) = single_entry(body, "term")?;
        let expected = match clause {
            Value::Object(options) => options
                .get("value")
                .ok_or_else(|| malformed("term", "missing [value]"))?,
            other => other,
        };
        let expected = Comparable::from(expected);

        Ok(
            field_values(self.document, field)
                .into_iter()
                .any(|value| Comparable::from(value) == expected)
        )
    }

    fn visit_terms(&self, body: &Value) -> IndexStoreResult<bool> {
        let (field, candidates) = single_entry(body, "terms")?;
        let candidates = candidates
            .as_array()
            .ok_or_else(|| malformed("terms", "expected an array of values"))?
            .iter()
            .map(Comparable::from)
            .collect::<Vec<_>>();

        Ok(
            field_values(self.document, field)
                .into_iter()
                .any(|value| candidates.contains(&Comparable::from(value)))
        )
    }

    fn visit_range(&self, body: &Value) -> IndexStoreResult<bool> {
        let (field, bounds) = single_entry(body, "range")?;
        let bounds = bounds
            .as_object()
            .ok_or_else(|| malformed("range", "expected an object of bounds"))?;

        let mut checks = Vec::new();

        for (op, bound) in bounds {
            let accepted: fn(Ordering) -> bool = match op.as_str() {
                "gt" => |ordering| ordering == Ordering::Greater,
                "gte" => |ordering| ordering != Ordering::Less,
                "lt" => |ordering| ordering == Ordering::Less,
                "lte" => |ordering| ordering != Ordering::Greater,
                other => return Err(malformed("range", &format!("unknown bound [{}]", other))),
            };

            checks.push((Comparable::from(bound), accepted));
        }

        Ok(
            field_values(self.document, field)
                .into_iter()
                .any(|value| {
                    let value = Comparable::from(value);

                    checks.iter().all(|(bound, accepted)| {
                        value
                            .partial_cmp(bound)
                            .is_some_and(|ordering| accepted(ordering))
                    })
                })
        )
    }

    fn visit_bool(&self, body: &Value) -> IndexStoreResult<bool> {
        let body = body
            .as_object()
            .ok_or_else(|| malformed("bool", "expected an object"))?;

        let must = clauses(body, "must");
        let filter = clauses(body, "filter");
        let must_not = clauses(body, "must_not");
        let should = clauses(body, "should");

        for clause in must.iter().chain(filter.iter()) {
            if !self.evaluate(clause)? {
                return Ok(false);
            }
        }

        for clause in &must_not {
            if self.evaluate(clause)? {
                return Ok(false);
            }
        }

        // Without must or filter clauses, at least one should clause has to match.
        if should.is_empty() || !(must.is_empty() && filter.is_empty()) {
            return Ok(true);
        }

        for clause in &should {
            if self.evaluate(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Clauses of a bool occurrence type, which may be a single clause or an array.
fn clauses<'v>(body: &'v Map<String, Value>, key: &str) -> Vec<&'v Value> {
    match body.get(key) {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(clause) => vec![clause],
    }
}

fn single_entry<'v>(value: &'v Value, context: &str) -> IndexStoreResult<(&'v str, &'v Value)> {
    let map = value
        .as_object()
        .ok_or_else(|| malformed(context, "expected an object"))?;

    let mut entries = map.iter();

    match (entries.next(), entries.next()) {
        (Some((key, value)), None) => Ok((key.as_str(), value)),
        _ => Err(malformed(context, "expected exactly one key")),
    }
}

fn malformed(context: &str, reason: &str) -> IndexStoreError {
    IndexStoreError::Backend(format!("parsing_exception: [{}] {}", context, reason))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortDirection {
    Asc,
    Desc,
}

/// One sort criterion of a search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn is_score(&self) -> bool {
        self.field == "_score"
    }
}

/// Parses the `sort` section of a search body.
///
/// Accepts `"field"`, `{"field": "desc"}`, `{"field": {"order": "desc"}}` and arrays
/// of those.
pub(crate) fn parse_sort(sort: &Value) -> IndexStoreResult<Vec<SortKey>> {
    match sort {
        Value::Array(items) => {
            let mut keys = Vec::new();

            for item in items {
                keys.extend(parse_sort(item)?);
            }

            Ok(keys)
        }
        Value::String(field) => Ok(vec![SortKey {
            field: field.clone(),
            direction: if field == "_score" { SortDirection::Desc } else { SortDirection::Asc },
        }]),
        Value::Object(_) => {
            let (field, order) = single_entry(sort, "sort")?;
            let order = match order {
                Value::Object(options) => options.get("order").and_then(Value::as_str),
                other => other.as_str(),
            };

            let direction = match order {
                Some("desc") => SortDirection::Desc,
                Some("asc") => SortDirection::Asc,
                None if field == "_score" => SortDirection::Desc,
                None => SortDirection::Asc,
                Some(other) => return Err(malformed("sort", &format!("unknown order [{}]", other))),
            };

            Ok(vec![SortKey {
                field: field.to_string(),
                direction,
            }])
        }
        _ => Err(malformed("sort", "expected a string, an object or an array")),
    }
}

/// Orders two `(id, document)` pairs by the given sort keys.
///
/// Documents missing a sort field go last in either direction. Every hit scores the
/// same, so `_score` never reorders; `_doc` orders by id.
pub(crate) fn compare_documents(
    keys: &[SortKey],
    (left_id, left): (&str, &Map<String, Value>),
    (right_id, right): (&str, &Map<String, Value>),
) -> Ordering {
    for key in keys {
        let ordering = match key.field.as_str() {
            "_score" => Ordering::Equal,
            "_doc" | "_id" => left_id.cmp(right_id),
            field => {
                let left = field_values(left, field).first().map(|value| Comparable::from(*value));
                let right = field_values(right, field).first().map(|value| Comparable::from(*value));

                match (left, right) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => return Ordering::Greater,
                    (Some(_), None) => return Ordering::Less,
                    (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                }
            }
        };

        let ordering = match key.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}
