//! Request options and response types exchanged with a [`SearchBackend`](crate::backend::SearchBackend).
//!
//! These mirror the subset of the store's request parameters and response envelopes
//! that the collection model needs. Query DSL fragments stay plain JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// When changes made by a write become visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refresh {
    /// Refresh the affected shards immediately.
    True,
    /// Do not refresh (the store's default).
    False,
    /// Wait for the next scheduled refresh before responding.
    WaitFor,
}

impl Refresh {
    pub fn as_str(&self) -> &'static str {
        match self {
            Refresh::True => "true",
            Refresh::False => "false",
            Refresh::WaitFor => "wait_for",
        }
    }
}

/// Options for document writes, deletes and bulk requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Refresh>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Store-side timeout, in the store's duration syntax (e.g. `"30s"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(mut self, refresh: Refresh) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Returns the options as URL query parameters.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();

        if let Some(refresh) = self.refresh {
            params.push(("refresh", refresh.as_str().to_string()));
        }
        if let Some(routing) = &self.routing {
            params.push(("routing", routing.clone()));
        }
        if let Some(timeout) = &self.timeout {
            params.push(("timeout", timeout.clone()));
        }

        params
    }
}

/// Options for searches and counts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preference: Option<String>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn preference(mut self, preference: impl Into<String>) -> Self {
        self.preference = Some(preference.into());
        self
    }

    /// Returns the options as URL query parameters.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();

        if let Some(routing) = &self.routing {
            params.push(("routing", routing.clone()));
        }
        if let Some(preference) = &self.preference {
            params.push(("preference", preference.clone()));
        }

        params
    }
}

/// Body of a search request.
///
/// # Example
///
/// ```ignore
/// use indexlayer::request::SearchBody;
/// use serde_json::json;
///
/// let body = SearchBody::new()
///     .query(json!({ "term": { "status": "published" } }))
///     .sort(json!([{ "created": "desc" }]))
///     .size(20);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggs: Option<Value>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    /// Whether the total hit count is exact. Collection searches default this to `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<bool>,
}

impl SearchBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn from(mut self, from: u64) -> Self {
        self.from = Some(from);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn aggs(mut self, aggs: Value) -> Self {
        self.aggs = Some(aggs);
        self
    }

    pub fn source(mut self, source: Value) -> Self {
        self.source = Some(source);
        self
    }

    pub fn track_total_hits(mut self, track: bool) -> Self {
        self.track_total_hits = Some(track);
        self
    }
}

/// Description of an existing remote collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexInfo {
    #[serde(default)]
    pub aliases: Map<String, Value>,
    #[serde(default)]
    pub mappings: Map<String, Value>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl IndexInfo {
    /// Returns the store's current mapping JSON for a top-level field.
    pub fn field_mapping(&self, field: &str) -> Option<&Value> {
        self.mappings
            .get("properties")
            .and_then(Value::as_object)
            .and_then(|properties| properties.get(field))
    }
}

/// A single document lookup result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Map<String, Value>>,
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// Raw search response as reported by the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
}

/// Outcome of a delete-by-query request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeleteByQueryResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub failures: Vec<Value>,
}

/// Outcome of a bulk request: one entry per action, in request order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}
