//! Error types and result types for index store operations.
//!
//! This module provides error handling for schema bootstrap, record coercion and
//! every remote store operation. Use [`IndexStoreResult<T>`] as the return type
//! for fallible operations.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with an index store.
///
/// Store signals that callers are expected to branch on (missing index, missing
/// document, conflicting create) get their own variants. Everything else the store
/// reports after a collection is synchronized surfaces as [`IndexStoreError::Backend`].
#[derive(Error, Debug)]
pub enum IndexStoreError {
    /// Serialization/deserialization error when converting to or from the wire format.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during backend initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The remote collection does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),
    /// The requested document was not found.
    /// The first argument is the document ID, the second is the index name.
    #[error("Document not found {0} in index {1}")]
    DocumentNotFound(String, String),
    /// A document with the given ID already exists.
    /// The first argument is the document ID, the second is the index name.
    #[error("Document {0} already exists in index {1}")]
    DocumentAlreadyExists(String, String),
    /// Input data could not be coerced into the declared field schema.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The declared field schema is not usable.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// A collection with this name was already declared on the client.
    #[error("Collection already declared: {0}")]
    CollectionAlreadyDeclared(String),
    /// Creating or reconciling the remote collection failed.
    ///
    /// The collection is left unsynchronized and the next operation retries the bootstrap.
    #[error("Schema bootstrap failed for index {index}: {source}")]
    SchemaBootstrap {
        index: String,
        #[source]
        source: Box<IndexStoreError>,
    },
    /// An error reported by the remote store.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl IndexStoreError {
    /// Returns `true` if this error is the store's "index does not exist" signal.
    pub fn is_index_not_found(&self) -> bool {
        matches!(self, IndexStoreError::IndexNotFound(_))
    }

    /// Returns `true` if this error is the store's "document does not exist" signal.
    pub fn is_document_not_found(&self) -> bool {
        matches!(self, IndexStoreError::DocumentNotFound(..))
    }

    pub(crate) fn bootstrap(index: &str, source: IndexStoreError) -> Self {
        IndexStoreError::SchemaBootstrap {
            index: index.to_string(),
            source: Box::new(source),
        }
    }
}

/// A specialized `Result` type for index store operations.
pub type IndexStoreResult<T> = Result<T, IndexStoreError>;

impl From<SerdeJsonError> for IndexStoreError {
    fn from(err: SerdeJsonError) -> Self {
        IndexStoreError::Serialization(err.to_string())
    }
}
