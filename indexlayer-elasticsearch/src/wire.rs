//! Response envelopes and request bodies of the Elasticsearch REST API.
//!
//! Everything here is pure: turning replies into results or errors, and rendering
//! bulk instructions as NDJSON. The HTTP plumbing lives in [`crate::store`].

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use tracing::debug;

use indexlayer_core::{
    bulk::BulkInstruction,
    error::{IndexStoreError, IndexStoreResult},
    request::{GetResponse, IndexInfo, SearchHit, SearchResponse},
};

/// Status and decoded JSON body of a reply. Empty bodies decode to `null`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn new(status: StatusCode, text: &str) -> IndexStoreResult<Self> {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).map_err(|e| {
                IndexStoreError::Serialization(format!("invalid response body ({}): {}", status, e))
            })?
        };

        Ok(Self { status, body })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the `error.type` of an error envelope.
    pub fn error_type(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|error| error.get("type"))
            .and_then(Value::as_str)
    }

    /// Decodes a successful reply, or maps the error envelope.
    pub fn parse<T: DeserializeOwned>(self, index: &str) -> IndexStoreResult<T> {
        if !self.is_success() {
            return Err(self.into_error(index));
        }

        Ok(serde_json::from_value(self.body)?)
    }

    /// Succeeds on any 2xx reply, discarding the body.
    pub fn ok(self, index: &str) -> IndexStoreResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.into_error(index))
        }
    }

    /// Reads a `GET /{index}` reply.
    ///
    /// The body is keyed by the concrete index name, which differs from `index` when
    /// it is an alias.
    pub fn index_info(self, index: &str) -> IndexStoreResult<IndexInfo> {
        let mut indices: Map<String, Value> = self.parse(index)?;

        let info = match indices.remove(index) {
            Some(info) => info,
            None => indices
                .into_iter()
                .next()
                .map(|(_, info)| info)
                .ok_or_else(|| IndexStoreError::IndexNotFound(index.to_string()))?,
        };

        Ok(serde_json::from_value(info)?)
    }

    /// Reads an index creation reply. Losing a creation race is not an error.
    pub fn created_index(self, index: &str) -> IndexStoreResult<()> {
        if self.error_type() == Some("resource_already_exists_exception") {
            debug!(index, "index already exists");
            return Ok(());
        }

        self.ok(index)
    }

    pub fn created_document(self, index: &str, id: &str) -> IndexStoreResult<()> {
        if self.status == StatusCode::CONFLICT {
            return Err(IndexStoreError::DocumentAlreadyExists(id.to_string(), index.to_string()));
        }

        self.ok(index)
    }

    pub fn updated_document(self, index: &str, id: &str) -> IndexStoreResult<()> {
        if self.error_type() == Some("document_missing_exception") {
            return Err(IndexStoreError::DocumentNotFound(id.to_string(), index.to_string()));
        }

        self.ok(index)
    }

    pub fn deleted_document(self, index: &str, id: &str) -> IndexStoreResult<()> {
        // A missing document is a 404 carrying `"result": "not_found"` and no error.
        if self.is_missing_document() {
            return Err(IndexStoreError::DocumentNotFound(id.to_string(), index.to_string()));
        }

        self.ok(index)
    }

    /// Reads a `GET /{index}/_doc/{id}` reply. A missing document is a regular
    /// `found: false` answer, a missing index is still an error.
    pub fn document(self, index: &str) -> IndexStoreResult<GetResponse> {
        if self.is_missing_document() {
            return Ok(serde_json::from_value(self.body)?);
        }

        self.parse(index)
    }

    fn is_missing_document(&self) -> bool {
        self.status == StatusCode::NOT_FOUND && self.error_type().is_none()
    }

    /// Maps an error envelope to an [`IndexStoreError`].
    ///
    /// `index_not_found_exception` becomes [`IndexStoreError::IndexNotFound`]; any other
    /// failure becomes [`IndexStoreError::Backend`] carrying status, type and reason.
    pub fn into_error(self, index: &str) -> IndexStoreError {
        if self.error_type() == Some("index_not_found_exception") {
            return IndexStoreError::IndexNotFound(index.to_string());
        }

        let error = self.body.get("error");
        let kind = self.error_type().unwrap_or("error");
        let reason = error
            .and_then(|error| error.get("reason"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| error.and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| self.body.to_string());

        IndexStoreError::Backend(format!("{} {}: {}", self.status.as_u16(), kind, reason))
    }
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    hits: RawHits,
    #[serde(default)]
    aggregations: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    #[serde(default)]
    total: Option<RawTotal>,
    #[serde(default)]
    hits: Vec<SearchHit>,
}

/// `hits.total` is an object unless the request asked for integer totals.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

/// Decodes a `_search` reply body.
pub(crate) fn search_response(body: Value) -> IndexStoreResult<SearchResponse> {
    let raw: RawSearchResponse = serde_json::from_value(body)?;

    let total = match raw.hits.total {
        Some(RawTotal::Count(total)) | Some(RawTotal::Object { value: total }) => total,
        None => raw.hits.hits.len() as u64,
    };

    Ok(SearchResponse {
        total,
        hits: raw.hits.hits,
        aggregations: raw.aggregations,
    })
}

/// Renders bulk instructions as an NDJSON body, one line each, newline-terminated.
pub(crate) fn ndjson(instructions: &[BulkInstruction]) -> IndexStoreResult<String> {
    let mut body = String::new();

    for instruction in instructions {
        body.push_str(&serde_json::to_string(instruction)?);
        body.push('\n');
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexlayer_core::bulk::BulkAction;
    use serde_json::{json, Map};

    #[test]
    fn missing_index_envelopes_map_to_index_not_found() {
        let reply = Reply::new(
            StatusCode::NOT_FOUND,
            r#"{"error":{"type":"index_not_found_exception","reason":"no such index [posts]"},"status":404}"#,
        )
        .unwrap();

        assert!(reply.into_error("posts").is_index_not_found());
    }

    #[test]
    fn other_envelopes_keep_type_and_reason() {
        let reply = Reply::new(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"type":"illegal_argument_exception","reason":"mapper [title] cannot be changed"},"status":400}"#,
        )
        .unwrap();

        match reply.into_error("posts") {
            IndexStoreError::Backend(message) => {
                assert_eq!(message, "400 illegal_argument_exception: mapper [title] cannot be changed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    fn reply(status: StatusCode, body: &str) -> Reply {
        Reply::new(status, body).unwrap()
    }

    const MISSING_INDEX: &str =
        r#"{"error":{"type":"index_not_found_exception","reason":"no such index [posts]"},"status":404}"#;

    #[test]
    fn index_info_follows_aliases() {
        let info = reply(
            StatusCode::OK,
            r#"{"posts_v2":{"settings":{"index":{"number_of_replicas":"1"}},"mappings":{"properties":{"title":{"type":"text"}}}}}"#,
        )
        .index_info("posts")
        .unwrap();

        assert_eq!(info.field_mapping("title"), Some(&json!({ "type": "text" })));
        assert!(reply(StatusCode::OK, "{}").index_info("posts").unwrap_err().is_index_not_found());
        assert!(reply(StatusCode::NOT_FOUND, MISSING_INDEX).index_info("posts").unwrap_err().is_index_not_found());
    }

    #[test]
    fn creating_an_existing_index_succeeds() {
        let existing = reply(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"type":"resource_already_exists_exception","reason":"index [posts/abc] already exists"},"status":400}"#,
        );
        let invalid = reply(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"type":"mapper_parsing_exception","reason":"no handler for type [strng]"},"status":400}"#,
        );

        assert!(existing.created_index("posts").is_ok());
        assert!(reply(StatusCode::OK, r#"{"acknowledged":true}"#).created_index("posts").is_ok());
        assert!(matches!(invalid.created_index("posts"), Err(IndexStoreError::Backend(_))));
    }

    #[test]
    fn create_conflicts_report_the_taken_id() {
        let conflict = reply(
            StatusCode::CONFLICT,
            r#"{"error":{"type":"version_conflict_engine_exception","reason":"[1]: version conflict, document already exists"},"status":409}"#,
        );

        assert!(matches!(
            conflict.created_document("posts", "1"),
            Err(IndexStoreError::DocumentAlreadyExists(id, index)) if id == "1" && index == "posts"
        ));
        assert!(reply(StatusCode::CREATED, r#"{"result":"created"}"#).created_document("posts", "1").is_ok());
        assert!(reply(StatusCode::NOT_FOUND, MISSING_INDEX).created_document("posts", "1").unwrap_err().is_index_not_found());
    }

    #[test]
    fn updating_a_missing_document_is_not_found() {
        let missing = reply(
            StatusCode::NOT_FOUND,
            r#"{"error":{"type":"document_missing_exception","reason":"[7]: document missing"},"status":404}"#,
        );

        assert!(missing.updated_document("posts", "7").unwrap_err().is_document_not_found());
        assert!(reply(StatusCode::NOT_FOUND, MISSING_INDEX).updated_document("posts", "7").unwrap_err().is_index_not_found());
        assert!(reply(StatusCode::OK, r#"{"result":"updated"}"#).updated_document("posts", "7").is_ok());
    }

    #[test]
    fn deleting_a_missing_document_is_not_found() {
        let missing = reply(
            StatusCode::NOT_FOUND,
            r#"{"_index":"posts","_id":"7","_version":1,"result":"not_found"}"#,
        );

        assert!(matches!(
            missing.deleted_document("posts", "7"),
            Err(IndexStoreError::DocumentNotFound(id, index)) if id == "7" && index == "posts"
        ));
        assert!(reply(StatusCode::NOT_FOUND, MISSING_INDEX).deleted_document("posts", "7").unwrap_err().is_index_not_found());
        assert!(reply(StatusCode::OK, r#"{"result":"deleted"}"#).deleted_document("posts", "7").is_ok());
    }

    #[test]
    fn missing_documents_are_not_errors_on_lookup() {
        let missing = reply(
            StatusCode::NOT_FOUND,
            r#"{"_index":"posts","_id":"7","found":false}"#,
        )
        .document("posts")
        .unwrap();

        assert_eq!(missing.id, "7");
        assert!(!missing.found);
        assert!(missing.source.is_none());

        let found = reply(
            StatusCode::OK,
            r#"{"_index":"posts","_id":"1","found":true,"_source":{"title":"a"}}"#,
        )
        .document("posts")
        .unwrap();

        assert!(found.found);
        assert_eq!(found.source.and_then(|source| source.get("title").cloned()), Some(json!("a")));
        assert!(reply(StatusCode::NOT_FOUND, MISSING_INDEX).document("posts").unwrap_err().is_index_not_found());
    }

    #[test]
    fn empty_bodies_decode_to_null() {
        let reply = Reply::new(StatusCode::OK, "").unwrap();

        assert_eq!(reply.body, Value::Null);
        assert!(reply.ok("posts").is_ok());
    }

    #[test]
    fn search_totals_accept_both_shapes() {
        let object = search_response(json!({
            "hits": {
                "total": { "value": 42, "relation": "eq" },
                "hits": [{ "_id": "1", "_score": 1.5, "_source": { "title": "a" } }]
            },
            "aggregations": { "n": { "value": 1 } }
        }))
        .unwrap();

        assert_eq!(object.total, 42);
        assert_eq!(object.hits[0].id, "1");
        assert_eq!(object.hits[0].score, Some(1.5));
        assert!(object.aggregations.is_some());

        let integer = search_response(json!({ "hits": { "total": 3, "hits": [] } })).unwrap();
        assert_eq!(integer.total, 3);
    }

    #[test]
    fn bulk_bodies_are_newline_terminated() {
        let mut doc = Map::new();
        doc.insert("title".to_string(), json!("a"));

        let body = ndjson(&[
            BulkInstruction::Action(BulkAction::Create { id: "1".to_string() }),
            BulkInstruction::Document(doc.clone()),
            BulkInstruction::Action(BulkAction::Update { id: "2".to_string() }),
            BulkInstruction::PartialDocument { doc },
            BulkInstruction::Action(BulkAction::Delete { id: "3".to_string() }),
        ])
        .unwrap();

        assert_eq!(
            body,
            concat!(
                r#"{"create":{"_id":"1"}}"#, "\n",
                r#"{"title":"a"}"#, "\n",
                r#"{"update":{"_id":"2"}}"#, "\n",
                r#"{"doc":{"title":"a"}}"#, "\n",
                r#"{"delete":{"_id":"3"}}"#, "\n",
            )
        );
    }
}
