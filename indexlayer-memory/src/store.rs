//! In-memory search store implementation.
//!
//! This module provides a simple in-memory backend that keeps indices as JSON
//! mappings, settings and documents in HashMaps behind async-safe read-write locks.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::{json, Map, Value};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::debug;

use indexlayer_core::{
    backend::{SearchBackend, SearchBackendBuilder},
    bulk::{BulkAction, BulkInstruction},
    error::{IndexStoreError, IndexStoreResult},
    request::{
        BulkResponse, DeleteByQueryResponse, GetResponse, IndexInfo, ReadOptions, SearchBody,
        SearchHit, SearchResponse, WriteOptions,
    },
    schema::{FieldDescriptor, IndexDefinition, STATIC_INDEX_SETTINGS},
};

use crate::evaluator::{compare_documents, parse_sort, QueryEvaluator, SortKey};

/// Number of hits a search returns when the body sets no `size`.
pub const DEFAULT_SEARCH_SIZE: u64 = 10;

type Document = Map<String, Value>;
type StoreMap = HashMap<String, IndexState>;

/// A single index: its mappings, settings, aliases and documents.
#[derive(Debug, Default)]
struct IndexState {
    mappings: Map<String, Value>,
    settings: Map<String, Value>,
    aliases: Map<String, Value>,
    /// Documents by id. Id order doubles as the index order (`_doc`).
    documents: BTreeMap<String, Document>,
}

impl IndexState {
    fn from_definition(definition: &IndexDefinition) -> IndexStoreResult<Self> {
        let mappings = match serde_json::to_value(&definition.mappings)? {
            Value::Object(mappings) => mappings,
            _ => Map::new(),
        };

        Ok(Self {
            mappings,
            settings: definition
                .settings
                .as_ref()
                .map(|settings| settings.index.clone())
                .unwrap_or_default(),
            aliases: definition
                .aliases
                .as_ref()
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            documents: BTreeMap::new(),
        })
    }

    fn info(&self) -> IndexInfo {
        let mut settings = Map::new();
        settings.insert("index".to_string(), Value::Object(self.settings.clone()));

        IndexInfo {
            aliases: self.aliases.clone(),
            mappings: self.mappings.clone(),
            settings,
        }
    }

    fn put_settings(&mut self, index: &str, settings: Map<String, Value>) -> IndexStoreResult<()> {
        let rejected = settings
            .keys()
            .map(|key| key.trim_start_matches("index."))
            .filter(|key| STATIC_INDEX_SETTINGS.contains(key))
            .map(|key| format!("index.{}", key))
            .collect::<Vec<_>>();

        if !rejected.is_empty() {
            return Err(IndexStoreError::Backend(format!(
                "illegal_argument_exception: Can't update non dynamic settings [{}] for open indices [{}]",
                rejected.join(", "),
                index
            )));
        }

        for (key, value) in settings {
            self.settings
                .insert(key.trim_start_matches("index.").to_string(), value);
        }

        Ok(())
    }

    fn put_mapping(&mut self, field: &str, descriptor: &FieldDescriptor) -> IndexStoreResult<()> {
        let incoming = descriptor.to_value()?;

        let properties = self
            .mappings
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));

        let Value::Object(properties) = properties else {
            return Err(IndexStoreError::Backend("mapper_parsing_exception: [properties] must be an object".to_string()));
        };

        match properties.get_mut(field) {
            Some(existing) => merge_mapping(existing, &incoming, field).map_err(IndexStoreError::Backend),
            None => {
                properties.insert(field.to_string(), incoming);
                Ok(())
            }
        }
    }

    fn create(&mut self, index: &str, id: &str, document: Document) -> IndexStoreResult<()> {
        if self.documents.contains_key(id) {
            return Err(IndexStoreError::DocumentAlreadyExists(id.to_string(), index.to_string()));
        }

        self.documents.insert(id.to_string(), document);

        Ok(())
    }

    fn update(&mut self, index: &str, id: &str, partial: Document) -> IndexStoreResult<()> {
        match self.documents.get_mut(id) {
            Some(document) => {
                merge_document(document, partial);
                Ok(())
            }
            None => Err(IndexStoreError::DocumentNotFound(id.to_string(), index.to_string())),
        }
    }

    fn delete(&mut self, index: &str, id: &str) -> IndexStoreResult<()> {
        match self.documents.remove(id) {
            Some(_) => Ok(()),
            None => Err(IndexStoreError::DocumentNotFound(id.to_string(), index.to_string())),
        }
    }

    fn get(&self, id: &str) -> GetResponse {
        let source = self.documents.get(id).cloned();

        GetResponse {
            id: id.to_string(),
            found: source.is_some(),
            source,
        }
    }

    /// Returns the documents matching `query` (all documents without one), in index order.
    fn matching(&self, query: Option<&Value>) -> IndexStoreResult<Vec<(&str, &Document)>> {
        let mut matched = Vec::new();

        for (id, document) in &self.documents {
            let is_match = match query {
                Some(query) => QueryEvaluator::new(document).evaluate(query)?,
                None => true,
            };

            if is_match {
                matched.push((id.as_str(), document));
            }
        }

        Ok(matched)
    }
}

/// Thread-safe in-memory search store backend.
///
/// This struct implements the [`SearchBackend`] trait with the remote store's document
/// semantics: creating an existing id conflicts, updating or deleting a missing
/// document fails, and static index settings cannot be changed once an index exists.
/// Searches understand a subset of the query DSL (see [`crate::evaluator`]). Every hit
/// scores `1.0`, and writes are visible immediately regardless of the refresh option.
///
/// # Thread Safety
///
/// `InMemorySearchStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Example
///
/// ```ignore
/// use indexlayer_memory::InMemorySearchStore;
/// use indexlayer_core::{backend::SearchBackend, request::WriteOptions, schema::*};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemorySearchStore::new();
///
///     store.create_index("users", &IndexDefinition::new(
///         FieldSchema::new().field("name", FieldDescriptor::keyword()),
///     )).await?;
///
///     let doc = json!({ "name": "Alice" }).as_object().cloned().unwrap();
///     store.create_document("users", "1", doc, &WriteOptions::default()).await?;
///
///     assert!(store.get_document("users", "1").await?.found);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemorySearchStore {
    /// index name -> index state
    indices: Arc<RwLock<StoreMap>>,
}

impl InMemorySearchStore {
    /// Creates a new store with no indices.
    pub fn new() -> Self {
        Self {
            indices: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemorySearchStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use indexlayer_memory::InMemorySearchStore;
    ///
    /// let store = InMemorySearchStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemorySearchStoreBuilder {
        InMemorySearchStoreBuilder::default()
    }

    /// Lists the names of all indices, sorted.
    pub async fn index_names(&self) -> Vec<String> {
        let mut names = self
            .indices
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();
        names
    }

    /// Removes an index and all of its documents. Returns whether it existed.
    pub async fn drop_index(&self, index: &str) -> bool {
        self.indices
            .write()
            .await
            .remove(index)
            .is_some()
    }
}

fn index_not_found(index: &str) -> IndexStoreError {
    IndexStoreError::IndexNotFound(index.to_string())
}

#[async_trait]
impl SearchBackend for InMemorySearchStore {
    async fn get_index(&self, index: &str) -> IndexStoreResult<IndexInfo> {
        self.indices
            .read()
            .await
            .get(index)
            .map(IndexState::info)
            .ok_or_else(|| index_not_found(index))
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> IndexStoreResult<()> {
        let mut indices = self.indices.write().await;

        if indices.contains_key(index) {
            debug!(index, "index already exists");
            return Ok(());
        }

        indices.insert(index.to_string(), IndexState::from_definition(definition)?);
        debug!(index, "created index");

        Ok(())
    }

    async fn put_settings(&self, index: &str, settings: Map<String, Value>) -> IndexStoreResult<()> {
        self.indices
            .write()
            .await
            .get_mut(index)
            .ok_or_else(|| index_not_found(index))?
            .put_settings(index, settings)
    }

    async fn put_mapping(
        &self,
        index: &str,
        field: &str,
        descriptor: &FieldDescriptor,
    ) -> IndexStoreResult<()> {
        self.indices
            .write()
            .await
            .get_mut(index)
            .ok_or_else(|| index_not_found(index))?
            .put_mapping(field, descriptor)
    }

    async fn create_document(
        &self,
        index: &str,
        id: &str,
        document: Map<String, Value>,
        _options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        self.indices
            .write()
            .await
            .get_mut(index)
            .ok_or_else(|| index_not_found(index))?
            .create(index, id, document)
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        _options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        self.indices
            .write()
            .await
            .get_mut(index)
            .ok_or_else(|| index_not_found(index))?
            .update(index, id, partial)
    }

    async fn delete_document(&self, index: &str, id: &str, _options: &WriteOptions) -> IndexStoreResult<()> {
        self.indices
            .write()
            .await
            .get_mut(index)
            .ok_or_else(|| index_not_found(index))?
            .delete(index, id)
    }

    async fn get_document(&self, index: &str, id: &str) -> IndexStoreResult<GetResponse> {
        self.indices
            .read()
            .await
            .get(index)
            .map(|state| state.get(id))
            .ok_or_else(|| index_not_found(index))
    }

    async fn mget_documents(&self, index: &str, ids: &[String]) -> IndexStoreResult<Vec<GetResponse>> {
        let indices = self.indices.read().await;
        let state = indices
            .get(index)
            .ok_or_else(|| index_not_found(index))?;

        Ok(ids.iter().map(|id| state.get(id)).collect())
    }

    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
        _options: &ReadOptions,
    ) -> IndexStoreResult<SearchResponse> {
        if body.aggs.is_some() {
            return Err(IndexStoreError::Backend(
                "aggregations are not supported by the in-memory store".to_string(),
            ));
        }

        let indices = self.indices.read().await;
        let state = indices
            .get(index)
            .ok_or_else(|| index_not_found(index))?;

        let mut matched = state.matching(body.query.as_ref())?;

        let sort = match &body.sort {
            Some(sort) => parse_sort(sort)?,
            None => Vec::new(),
        };

        if !sort.is_empty() {
            matched.sort_by(|left, right| compare_documents(&sort, *left, *right));
        }

        // Like the store, hits sorted by a field carry no score.
        let scored = sort.is_empty() || sort.iter().any(SortKey::is_score);

        let total = matched.len() as u64;
        let from = body.from.unwrap_or(0) as usize;
        let size = body.size.unwrap_or(DEFAULT_SEARCH_SIZE) as usize;

        let hits = matched
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, document)| SearchHit {
                id: id.to_string(),
                score: scored.then_some(1.0),
                source: filter_source(document, body.source.as_ref()),
            })
            .collect();

        Ok(SearchResponse {
            total,
            hits,
            aggregations: None,
        })
    }

    async fn count(&self, index: &str, query: Option<&Value>, _options: &ReadOptions) -> IndexStoreResult<u64> {
        let indices = self.indices.read().await;
        let state = indices
            .get(index)
            .ok_or_else(|| index_not_found(index))?;

        Ok(state.matching(query)?.len() as u64)
    }

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        _options: &WriteOptions,
    ) -> IndexStoreResult<DeleteByQueryResponse> {
        let mut indices = self.indices.write().await;
        let state = indices
            .get_mut(index)
            .ok_or_else(|| index_not_found(index))?;

        let ids = state
            .matching(Some(query))?
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect::<Vec<_>>();

        for id in &ids {
            state.documents.remove(id);
        }

        debug!(index, deleted = ids.len(), "deleted by query");

        Ok(DeleteByQueryResponse {
            total: ids.len() as u64,
            deleted: ids.len() as u64,
            failures: Vec::new(),
        })
    }

    async fn bulk(
        &self,
        index: &str,
        instructions: &[BulkInstruction],
        _options: &WriteOptions,
    ) -> IndexStoreResult<BulkResponse> {
        let mut indices = self.indices.write().await;
        let state = indices
            .get_mut(index)
            .ok_or_else(|| index_not_found(index))?;

        let mut items = Vec::new();
        let mut errors = false;
        let mut lines = instructions.iter();

        while let Some(line) = lines.next() {
            let BulkInstruction::Action(action) = line else {
                return Err(malformed_bulk("expected an action line"));
            };

            let outcome = match action {
                BulkAction::Create { id } => match lines.next() {
                    Some(BulkInstruction::Document(document)) => state
                        .create(index, id, document.clone())
                        .map(|_| (201, "created")),
                    _ => return Err(malformed_bulk("create must be followed by a document")),
                },
                BulkAction::Update { id } => match lines.next() {
                    Some(BulkInstruction::PartialDocument { doc }) => state
                        .update(index, id, doc.clone())
                        .map(|_| (200, "updated")),
                    _ => return Err(malformed_bulk("update must be followed by a partial document")),
                },
                BulkAction::Delete { id } => state
                    .delete(index, id)
                    .map(|_| (200, "deleted")),
            };

            let item = match outcome {
                Ok((status, result)) => json!({
                    "_index": index,
                    "_id": action.id(),
                    "status": status,
                    "result": result
                }),
                // A missing document is not an error for bulk deletes.
                Err(IndexStoreError::DocumentNotFound(..)) if matches!(action, BulkAction::Delete { .. }) => json!({
                    "_index": index,
                    "_id": action.id(),
                    "status": 404,
                    "result": "not_found"
                }),
                Err(err) => {
                    errors = true;

                    let (status, kind) = match &err {
                        IndexStoreError::DocumentAlreadyExists(..) => (409, "version_conflict_engine_exception"),
                        IndexStoreError::DocumentNotFound(..) => (404, "document_missing_exception"),
                        _ => (400, "illegal_argument_exception"),
                    };

                    json!({
                        "_index": index,
                        "_id": action.id(),
                        "status": status,
                        "error": { "type": kind, "reason": err.to_string() }
                    })
                }
            };

            let mut entry = Map::new();
            entry.insert(action.name().to_string(), item);
            items.push(Value::Object(entry));
        }

        debug!(index, items = items.len(), errors, "applied bulk request");

        Ok(BulkResponse {
            took: 0,
            errors,
            items,
        })
    }
}

fn malformed_bulk(reason: &str) -> IndexStoreError {
    IndexStoreError::Backend(format!("illegal_argument_exception: malformed bulk request, {}", reason))
}

/// Merges an incoming field mapping into the existing one.
///
/// Object properties are merged recursively. Changing the type of an existing
/// field is rejected, as the store does.
fn merge_mapping(existing: &mut Value, incoming: &Value, path: &str) -> Result<(), String> {
    match (existing, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            let current_type = existing.get("type").and_then(Value::as_str);
            let incoming_type = incoming.get("type").and_then(Value::as_str);

            if let (Some(current), Some(next)) = (current_type, incoming_type) {
                if current != next {
                    return Err(format!(
                        "illegal_argument_exception: mapper [{}] cannot be changed from type [{}] to [{}]",
                        path, current, next
                    ));
                }
            }

            for (key, value) in incoming {
                match (key.as_str(), existing.get_mut(key), value) {
                    ("properties", Some(Value::Object(current)), Value::Object(properties)) => {
                        for (name, mapping) in properties {
                            match current.get_mut(name) {
                                Some(field) => merge_mapping(field, mapping, &format!("{}.{}", path, name))?,
                                None => {
                                    current.insert(name.clone(), mapping.clone());
                                }
                            }
                        }
                    }
                    _ => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }

            Ok(())
        }
        (existing, incoming) => {
            *existing = incoming.clone();
            Ok(())
        }
    }
}

/// Applies a partial document: objects merge recursively, everything else is replaced.
fn merge_document(target: &mut Document, partial: Document) {
    for (key, value) in partial {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(current)), Value::Object(incoming)) => merge_document(current, incoming),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Applies `_source` filtering to a hit. Only top-level fields are selected.
fn filter_source(document: &Document, source: Option<&Value>) -> Document {
    let top_level = |field: &str| field.split('.').next().unwrap_or(field).to_string();
    let strings = |value: Option<&Value>| -> Vec<String> {
        match value {
            Some(Value::String(field)) => vec![top_level(field)],
            Some(Value::Array(fields)) => fields
                .iter()
                .filter_map(Value::as_str)
                .map(top_level)
                .collect(),
            _ => Vec::new(),
        }
    };

    let (includes, excludes) = match source {
        None | Some(Value::Bool(true)) => return document.clone(),
        Some(Value::Bool(false)) => return Document::new(),
        Some(Value::Object(filter)) => (strings(filter.get("includes")), strings(filter.get("excludes"))),
        fields => (strings(fields), Vec::new()),
    };

    document
        .iter()
        .filter(|(key, _)| includes.is_empty() || includes.contains(*key))
        .filter(|(key, _)| !excludes.contains(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Builder for constructing [`InMemorySearchStore`] instances.
///
/// # Example
///
/// ```ignore
/// use indexlayer_memory::InMemorySearchStore;
/// use indexlayer::backend::SearchBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemorySearchStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemorySearchStoreBuilder;

#[async_trait]
impl SearchBackendBuilder for InMemorySearchStoreBuilder {
    type Backend = InMemorySearchStore;

    /// Builds and returns a new [`InMemorySearchStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> IndexStoreResult<Self::Backend> {
        Ok(InMemorySearchStore::new())
    }
}
