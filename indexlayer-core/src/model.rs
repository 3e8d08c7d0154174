//! Collection models: typed access to one remote index.
//!
//! A [`CollectionModel`] is declared once per index on a [`Client`](crate::client::Client).
//! It builds [`Record`]s from raw data through the coercion engine and exposes the
//! collection-wide operations (search, count, lookups, deletes, bulk). Every remote
//! operation first passes through the model's schema synchronizer, so the remote index
//! is created or reconciled lazily, exactly once, before it is used.
//!
//! # Example
//!
//! ```ignore
//! use indexlayer::prelude::*;
//! use serde_json::json;
//!
//! let posts = client.declare_collection("posts", definition)?;
//!
//! posts.record("1", json!({ "title": "Hello" }))?
//!     .create(&WriteOptions::new().refresh(Refresh::WaitFor))
//!     .await?;
//!
//! let result = posts
//!     .search(SearchBody::new().query(json!({ "match": { "title": "hello" } })), &ReadOptions::default())
//!     .await?;
//!
//! for hit in result.hits {
//!     println!("{} scored {:?}", hit.id(), hit.score());
//! }
//! ```

use serde_json::{Map, Value};
use std::{fmt, sync::Arc};
use uuid::Uuid;

use crate::{
    backend::SearchBackend,
    bulk::{compile_bulk, BulkItem},
    coerce::{coerce_stored, coerce_value},
    error::IndexStoreResult,
    record::Record,
    request::{BulkResponse, DeleteByQueryResponse, ReadOptions, SearchBody, WriteOptions},
    schema::{FieldSchema, IndexDefinition},
    sync::{SchemaSynchronizer, SyncState},
};

struct ModelInner<B: SearchBackend> {
    name: String,
    definition: IndexDefinition,
    backend: Arc<B>,
    sync: SchemaSynchronizer,
}

/// Handle to a declared collection.
///
/// Cloning is cheap: clones share the definition, the backend and the
/// synchronization state.
pub struct CollectionModel<B: SearchBackend> {
    inner: Arc<ModelInner<B>>,
}

/// Result of a collection search.
#[derive(Debug)]
pub struct SearchResult<B: SearchBackend> {
    /// Total number of matching documents.
    pub total: u64,
    /// Hydrated hits, each carrying its relevance score.
    pub hits: Vec<Record<B>>,
    /// Aggregation results, if any were requested.
    pub aggregations: Option<Value>,
}

impl<B: SearchBackend> CollectionModel<B> {
    pub(crate) fn new(name: String, definition: IndexDefinition, backend: Arc<B>) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                name,
                definition,
                backend,
                sync: SchemaSynchronizer::new(),
            }),
        }
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.inner.definition
    }

    pub fn schema(&self) -> &FieldSchema {
        self.inner.definition.schema()
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Returns the current synchronization state of the remote index.
    pub fn sync_state(&self) -> SyncState {
        self.inner.sync.state()
    }

    /// Creates or reconciles the remote index if that has not happened yet.
    ///
    /// Every remote operation calls this first; calling it directly bootstraps eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::SchemaBootstrap`](crate::error::IndexStoreError::SchemaBootstrap)
    /// if the bootstrap attempt made by this call failed.
    pub async fn ensure_synced(&self) -> IndexStoreResult<()> {
        self.inner
            .sync
            .ensure_synced(&*self.inner.backend, &self.inner.name, &self.inner.definition)
            .await
    }

    /// Builds a record from raw data. Nothing is sent to the store.
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::InvalidDocument`](crate::error::IndexStoreError::InvalidDocument)
    /// if the data does not fit the schema.
    pub fn record(&self, id: impl Into<String>, data: Value) -> IndexStoreResult<Record<B>> {
        Ok(Record::new(
            self.clone(),
            id.into(),
            None,
            coerce_value(&data, self.schema())?,
        ))
    }

    /// Builds a record with a freshly generated UUIDv4 id.
    pub fn new_record(&self, data: Value) -> IndexStoreResult<Record<B>> {
        self.record(Uuid::new_v4().to_string(), data)
    }

    /// Searches the collection.
    ///
    /// `track_total_hits` defaults to `true` so that `total` is exact unless the
    /// caller relaxes it explicitly.
    pub async fn search(&self, body: SearchBody, options: &ReadOptions) -> IndexStoreResult<SearchResult<B>> {
        self.ensure_synced().await?;

        let body = SearchBody {
            track_total_hits: Some(body.track_total_hits.unwrap_or(true)),
            ..body
        };

        let response = self
            .backend()
            .search(self.name(), &body, options)
            .await?;

        Ok(SearchResult {
            total: response.total,
            hits: response
                .hits
                .into_iter()
                .map(|hit| self.hydrate(hit.id, &hit.source, hit.score))
                .collect(),
            aggregations: response.aggregations,
        })
    }

    /// Counts the documents matching `query`, or every document without one.
    pub async fn count(&self, query: Option<Value>, options: &ReadOptions) -> IndexStoreResult<u64> {
        self.ensure_synced().await?;

        self.backend()
            .count(self.name(), query.as_ref(), options)
            .await
    }

    /// Fetches a document by id. Returns `None` if the store reports it absent.
    pub async fn get(&self, id: &str) -> IndexStoreResult<Option<Record<B>>> {
        self.ensure_synced().await?;

        let response = self
            .backend()
            .get_document(self.name(), id)
            .await?;

        if !response.found {
            return Ok(None);
        }

        // A found document without `_source` still exists, only its data is withheld.
        let source = response.source.unwrap_or_default();

        Ok(Some(self.hydrate(response.id, &source, None)))
    }

    /// Fetches several documents by id. Ids the store reports absent are skipped.
    pub async fn mget<I, S>(&self, ids: I) -> IndexStoreResult<Vec<Record<B>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_synced().await?;

        let ids = ids
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .backend()
            .mget_documents(self.name(), &ids)
            .await?
            .into_iter()
            .filter(|response| response.found)
            .map(|response| {
                let source = response.source.unwrap_or_default();
                self.hydrate(response.id, &source, None)
            })
            .collect())
    }

    /// Deletes a document by id.
    pub async fn delete(&self, id: &str, options: &WriteOptions) -> IndexStoreResult<()> {
        self.ensure_synced().await?;

        self.backend()
            .delete_document(self.name(), id, options)
            .await
    }

    /// Deletes every document matching `query`.
    pub async fn delete_by_query(&self, query: Value, options: &WriteOptions) -> IndexStoreResult<DeleteByQueryResponse> {
        self.ensure_synced().await?;

        self.backend()
            .delete_by_query(self.name(), &query, options)
            .await
    }

    /// Runs create, update and delete intents as one bulk request.
    ///
    /// Updates whose payload coerces to nothing are dropped. If nothing is left to
    /// send, no request is made and an empty response is returned.
    pub async fn bulk(&self, items: &[BulkItem], options: &WriteOptions) -> IndexStoreResult<BulkResponse> {
        self.ensure_synced().await?;

        let instructions = compile_bulk(items, self.schema())?;

        if instructions.is_empty() {
            return Ok(BulkResponse::default());
        }

        self.backend()
            .bulk(self.name(), &instructions, options)
            .await
    }

    fn hydrate(&self, id: String, source: &Map<String, Value>, score: Option<f64>) -> Record<B> {
        Record::new(self.clone(), id, score, coerce_stored(source, self.schema()))
    }
}

impl<B: SearchBackend> Clone for CollectionModel<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SearchBackend> fmt::Debug for CollectionModel<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionModel")
            .field("name", &self.inner.name)
            .field("sync", &self.inner.sync)
            .finish()
    }
}
