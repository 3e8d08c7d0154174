//! Remote store abstraction for collection models.
//!
//! This module defines the traits that abstract over the remote search/document store,
//! allowing collection models to work with any implementation (in-memory, HTTP, mocked).
//!
//! # Overview
//!
//! The [`SearchBackend`] trait is the whole surface the mapping layer consumes: four
//! index administration operations used by the schema synchronizer, and the document,
//! search and bulk operations used by collection models and records.
//!
//! Implementations own the wire protocol. The only signals the mapping layer relies on
//! are a distinguishable [`IndexNotFound`](crate::error::IndexStoreError::IndexNotFound)
//! from [`get_index`](SearchBackend::get_index), an idempotent
//! [`create_index`](SearchBackend::create_index), and single-field
//! [`put_mapping`](SearchBackend::put_mapping) extensions.
//!
//! # Traits
//!
//! - [`SearchBackend`]: The core trait for remote stores
//! - [`SearchBackendBuilder`]: Factory trait for creating backend instances

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{fmt::Debug, sync::Arc};

use crate::{
    bulk::BulkInstruction,
    error::IndexStoreResult,
    request::{
        BulkResponse, DeleteByQueryResponse, GetResponse, IndexInfo, ReadOptions, SearchBody,
        SearchResponse, WriteOptions,
    },
    schema::{FieldDescriptor, IndexDefinition},
};

/// Abstract interface for remote search stores.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: a single backend is shared by every
/// collection model of a client and called from concurrent tasks.
///
/// # Error Handling
///
/// Operations return [`IndexStoreResult<T>`](crate::error::IndexStoreResult). Missing
/// documents in lookups are reported through [`GetResponse::found`], not as errors.
#[async_trait]
pub trait SearchBackend: Send + Sync + Debug {
    /// Fetches the current settings and mappings of an index.
    ///
    /// Returns [`IndexNotFound`](crate::error::IndexStoreError::IndexNotFound) if the
    /// index does not exist.
    async fn get_index(&self, index: &str) -> IndexStoreResult<IndexInfo>;

    /// Creates an index with the full definition.
    ///
    /// Creating an index that already exists must succeed.
    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> IndexStoreResult<()>;

    /// Applies index-level settings to an existing index.
    ///
    /// `settings` is the content of the `index` settings object.
    async fn put_settings(&self, index: &str, settings: Map<String, Value>) -> IndexStoreResult<()>;

    /// Adds or extends the mapping of a single top-level field.
    async fn put_mapping(
        &self,
        index: &str,
        field: &str,
        descriptor: &FieldDescriptor,
    ) -> IndexStoreResult<()>;

    /// Indexes a new document. Fails with
    /// [`DocumentAlreadyExists`](crate::error::IndexStoreError::DocumentAlreadyExists)
    /// if the id is taken.
    async fn create_document(
        &self,
        index: &str,
        id: &str,
        document: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()>;

    /// Merges fields into an existing document.
    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()>;

    /// Removes a document. Fails with
    /// [`DocumentNotFound`](crate::error::IndexStoreError::DocumentNotFound) if absent.
    async fn delete_document(&self, index: &str, id: &str, options: &WriteOptions) -> IndexStoreResult<()>;

    /// Looks up a single document.
    async fn get_document(&self, index: &str, id: &str) -> IndexStoreResult<GetResponse>;

    /// Looks up several documents. One response per id, in request order.
    async fn mget_documents(&self, index: &str, ids: &[String]) -> IndexStoreResult<Vec<GetResponse>>;

    /// Runs a search request.
    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
        options: &ReadOptions,
    ) -> IndexStoreResult<SearchResponse>;

    /// Counts the documents matching a query, or all documents without one.
    async fn count(&self, index: &str, query: Option<&Value>, options: &ReadOptions) -> IndexStoreResult<u64>;

    /// Deletes every document matching a query.
    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        options: &WriteOptions,
    ) -> IndexStoreResult<DeleteByQueryResponse>;

    /// Executes a compiled bulk instruction sequence.
    async fn bulk(
        &self,
        index: &str,
        instructions: &[BulkInstruction],
        options: &WriteOptions,
    ) -> IndexStoreResult<BulkResponse>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> IndexStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> SearchBackend for &B
where
    B: SearchBackend + ?Sized,
{
    async fn get_index(&self, index: &str) -> IndexStoreResult<IndexInfo> {
        (**self).get_index(index).await
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> IndexStoreResult<()> {
        (**self).create_index(index, definition).await
    }

    async fn put_settings(&self, index: &str, settings: Map<String, Value>) -> IndexStoreResult<()> {
        (**self).put_settings(index, settings).await
    }

    async fn put_mapping(
        &self,
        index: &str,
        field: &str,
        descriptor: &FieldDescriptor,
    ) -> IndexStoreResult<()> {
        (**self).put_mapping(index, field, descriptor).await
    }

    async fn create_document(
        &self,
        index: &str,
        id: &str,
        document: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        (**self)
            .create_document(index, id, document, options)
            .await
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        (**self)
            .update_document(index, id, partial, options)
            .await
    }

    async fn delete_document(&self, index: &str, id: &str, options: &WriteOptions) -> IndexStoreResult<()> {
        (**self).delete_document(index, id, options).await
    }

    async fn get_document(&self, index: &str, id: &str) -> IndexStoreResult<GetResponse> {
        (**self).get_document(index, id).await
    }

    async fn mget_documents(&self, index: &str, ids: &[String]) -> IndexStoreResult<Vec<GetResponse>> {
        (**self).mget_documents(index, ids).await
    }

    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
        options: &ReadOptions,
    ) -> IndexStoreResult<SearchResponse> {
        (**self).search(index, body, options).await
    }

    async fn count(&self, index: &str, query: Option<&Value>, options: &ReadOptions) -> IndexStoreResult<u64> {
        (**self).count(index, query, options).await
    }

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        options: &WriteOptions,
    ) -> IndexStoreResult<DeleteByQueryResponse> {
        (**self).delete_by_query(index, query, options).await
    }

    async fn bulk(
        &self,
        index: &str,
        instructions: &[BulkInstruction],
        options: &WriteOptions,
    ) -> IndexStoreResult<BulkResponse> {
        (**self).bulk(index, instructions, options).await
    }
}

#[async_trait]
impl<B> SearchBackend for Arc<B>
where
    B: SearchBackend + ?Sized,
{
    async fn get_index(&self, index: &str) -> IndexStoreResult<IndexInfo> {
        (**self).get_index(index).await
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> IndexStoreResult<()> {
        (**self).create_index(index, definition).await
    }

    async fn put_settings(&self, index: &str, settings: Map<String, Value>) -> IndexStoreResult<()> {
        (**self).put_settings(index, settings).await
    }

    async fn put_mapping(
        &self,
        index: &str,
        field: &str,
        descriptor: &FieldDescriptor,
    ) -> IndexStoreResult<()> {
        (**self).put_mapping(index, field, descriptor).await
    }

    async fn create_document(
        &self,
        index: &str,
        id: &str,
        document: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        (**self)
            .create_document(index, id, document, options)
            .await
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        (**self)
            .update_document(index, id, partial, options)
            .await
    }

    async fn delete_document(&self, index: &str, id: &str, options: &WriteOptions) -> IndexStoreResult<()> {
        (**self).delete_document(index, id, options).await
    }

    async fn get_document(&self, index: &str, id: &str) -> IndexStoreResult<GetResponse> {
        (**self).get_document(index, id).await
    }

    async fn mget_documents(&self, index: &str, ids: &[String]) -> IndexStoreResult<Vec<GetResponse>> {
        (**self).mget_documents(index, ids).await
    }

    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
        options: &ReadOptions,
    ) -> IndexStoreResult<SearchResponse> {
        (**self).search(index, body, options).await
    }

    async fn count(&self, index: &str, query: Option<&Value>, options: &ReadOptions) -> IndexStoreResult<u64> {
        (**self).count(index, query, options).await
    }

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        options: &WriteOptions,
    ) -> IndexStoreResult<DeleteByQueryResponse> {
        (**self).delete_by_query(index, query, options).await
    }

    async fn bulk(
        &self,
        index: &str,
        instructions: &[BulkInstruction],
        options: &WriteOptions,
    ) -> IndexStoreResult<BulkResponse> {
        (**self).bulk(index, instructions, options).await
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait SearchBackendBuilder {
    type Backend: SearchBackend;

    async fn build(self) -> IndexStoreResult<Self::Backend>;
}
