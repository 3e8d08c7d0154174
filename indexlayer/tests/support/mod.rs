//! Shared fixtures: a backend wrapper that records calls and injects failures.

#![allow(dead_code)]

use indexlayer::{
    async_trait,
    bulk::BulkInstruction,
    memory::InMemorySearchStore,
    prelude::*,
    request::{GetResponse, IndexInfo, SearchResponse},
};
use serde_json::{Map, Value};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

/// Wraps an [`InMemorySearchStore`], recording every call by name.
///
/// Index administration calls are recorded with their argument (`put_mapping:title`,
/// `put_settings:number_of_replicas`), bulk calls with their instruction count.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub inner: InMemorySearchStore,
    calls: Mutex<Vec<String>>,
    failing_lookups: AtomicUsize,
    lookup_delay: Option<Duration>,
    last_search: Mutex<Option<SearchBody>>,
    withhold_sources: AtomicBool,
}

impl RecordingBackend {
    pub fn new(inner: InMemorySearchStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Delays every `get_index`, widening the window for concurrent callers.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// Makes the next `count` calls to `get_index` fail with a backend error.
    pub fn fail_next_lookups(&self, count: usize) {
        self.failing_lookups.store(count, Ordering::SeqCst);
    }

    /// Answers lookups like a store with `_source` disabled: found, but without data.
    pub fn withhold_sources(&self) {
        self.withhold_sources.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose name starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn last_search(&self) -> Option<SearchBody> {
        self.last_search.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl SearchBackend for RecordingBackend {
    async fn get_index(&self, index: &str) -> IndexStoreResult<IndexInfo> {
        self.record("get_index");

        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failing_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();

        if should_fail {
            return Err(IndexStoreError::Backend("connection refused".to_string()));
        }

        self.inner.get_index(index).await
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> IndexStoreResult<()> {
        self.record("create_index");
        self.inner.create_index(index, definition).await
    }

    async fn put_settings(&self, index: &str, settings: Map<String, Value>) -> IndexStoreResult<()> {
        let mut keys = settings.keys().cloned().collect::<Vec<_>>();
        keys.sort();

        self.record(format!("put_settings:{}", keys.join(",")));
        self.inner.put_settings(index, settings).await
    }

    async fn put_mapping(
        &self,
        index: &str,
        field: &str,
        descriptor: &FieldDescriptor,
    ) -> IndexStoreResult<()> {
        self.record(format!("put_mapping:{}", field));
        self.inner.put_mapping(index, field, descriptor).await
    }

    async fn create_document(
        &self,
        index: &str,
        id: &str,
        document: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        self.record("create_document");
        self.inner.create_document(index, id, document, options).await
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        self.record("update_document");
        self.inner.update_document(index, id, partial, options).await
    }

    async fn delete_document(&self, index: &str, id: &str, options: &WriteOptions) -> IndexStoreResult<()> {
        self.record("delete_document");
        self.inner.delete_document(index, id, options).await
    }

    async fn get_document(&self, index: &str, id: &str) -> IndexStoreResult<GetResponse> {
        self.record("get_document");

        let mut response = self.inner.get_document(index, id).await?;
        if self.withhold_sources.load(Ordering::SeqCst) {
            response.source = None;
        }

        Ok(response)
    }

    async fn mget_documents(&self, index: &str, ids: &[String]) -> IndexStoreResult<Vec<GetResponse>> {
        self.record("mget_documents");

        let mut responses = self.inner.mget_documents(index, ids).await?;
        if self.withhold_sources.load(Ordering::SeqCst) {
            for response in &mut responses {
                response.source = None;
            }
        }

        Ok(responses)
    }

    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
        options: &ReadOptions,
    ) -> IndexStoreResult<SearchResponse> {
        self.record("search");
        *self.last_search.lock().unwrap() = Some(body.clone());
        self.inner.search(index, body, options).await
    }

    async fn count(&self, index: &str, query: Option<&Value>, options: &ReadOptions) -> IndexStoreResult<u64> {
        self.record("count");
        self.inner.count(index, query, options).await
    }

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        options: &WriteOptions,
    ) -> IndexStoreResult<DeleteByQueryResponse> {
        self.record("delete_by_query");
        self.inner.delete_by_query(index, query, options).await
    }

    async fn bulk(
        &self,
        index: &str,
        instructions: &[BulkInstruction],
        options: &WriteOptions,
    ) -> IndexStoreResult<BulkResponse> {
        self.record(format!("bulk:{}", instructions.len()));
        self.inner.bulk(index, instructions, options).await
    }
}

/// The schema most tests declare: `{stringField: keyword, count: long}`.
pub fn test_schema() -> FieldSchema {
    FieldSchema::new()
        .field("stringField", FieldDescriptor::keyword())
        .field("count", FieldDescriptor::long())
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}
