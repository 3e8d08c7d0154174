//! Records: one document of a collection, held as canonical data.

use serde_json::{Map, Value};
use std::fmt;

use crate::{
    backend::SearchBackend,
    coerce::{coerce_value, project_output, CanonicalData},
    error::IndexStoreResult,
    model::CollectionModel,
    request::WriteOptions,
};

/// A single document bound to its collection model.
///
/// Records are built by [`CollectionModel::record`], [`CollectionModel::new_record`] or
/// returned by the model's lookups and searches. The data a record holds has always
/// passed through the coercion engine, so it only ever contains declared fields.
pub struct Record<B: SearchBackend> {
    model: CollectionModel<B>,
    id: String,
    score: Option<f64>,
    data: CanonicalData,
}

impl<B: SearchBackend> Record<B> {
    pub(crate) fn new(model: CollectionModel<B>, id: String, score: Option<f64>, data: CanonicalData) -> Self {
        Self {
            model,
            id,
            score,
            data,
        }
    }

    /// Returns the name of the index the record belongs to.
    pub fn index(&self) -> &str {
        self.model.name()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Relevance score. Only set on records hydrated from search hits.
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn data(&self) -> &CanonicalData {
        &self.data
    }

    pub fn into_data(self) -> CanonicalData {
        self.data
    }

    pub fn model(&self) -> &CollectionModel<B> {
        &self.model
    }

    /// Returns the record's data in the shape it is sent to the store.
    pub fn to_canonical_data(&self) -> Map<String, Value> {
        project_output(&self.data, self.model.schema())
    }

    /// Coerces `data` and merges it over the current data.
    ///
    /// Fields not mentioned in `data` keep their values. Nothing is sent to the store.
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::InvalidDocument`](crate::error::IndexStoreError::InvalidDocument)
    /// and leaves the record untouched if `data` does not fit the schema.
    pub fn set(&mut self, data: Value) -> IndexStoreResult<&mut Self> {
        let coerced = coerce_value(&data, self.model.schema())?;
        self.data.merge(coerced);

        Ok(self)
    }

    /// Indexes the record as a new document.
    pub async fn create(&self, options: &WriteOptions) -> IndexStoreResult<()> {
        self.model.ensure_synced().await?;

        self.model
            .backend()
            .create_document(self.index(), &self.id, self.to_canonical_data(), options)
            .await
    }

    /// Sends the record's data as a partial update of the stored document.
    ///
    /// A record without data makes no request.
    pub async fn update(&self, options: &WriteOptions) -> IndexStoreResult<()> {
        self.model.ensure_synced().await?;

        if self.data.is_empty() {
            tracing::trace!(index = self.index(), id = %self.id, "skipping empty update");
            return Ok(());
        }

        self.model
            .backend()
            .update_document(self.index(), &self.id, self.to_canonical_data(), options)
            .await
    }

    /// Deletes the stored document.
    pub async fn delete(&self, options: &WriteOptions) -> IndexStoreResult<()> {
        self.model.ensure_synced().await?;

        self.model
            .backend()
            .delete_document(self.index(), &self.id, options)
            .await
    }
}

impl<B: SearchBackend> Clone for Record<B> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            id: self.id.clone(),
            score: self.score,
            data: self.data.clone(),
        }
    }
}

impl<B: SearchBackend> PartialEq for Record<B> {
    fn eq(&self, other: &Self) -> bool {
        self.index() == other.index()
            && self.id == other.id
            && self.score == other.score
            && self.data == other.data
    }
}

impl<B: SearchBackend> fmt::Debug for Record<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("index", &self.index())
            .field("id", &self.id)
            .field("score", &self.score)
            .field("data", &self.data)
            .finish()
    }
}
