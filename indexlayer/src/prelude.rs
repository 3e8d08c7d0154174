//! Convenient re-exports of commonly used types from indexlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use indexlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The client, collection models and records
//! - Field schemas and index definitions
//! - Backend traits and builders
//! - Request options, bulk intents and response types
//! - Error types

pub use indexlayer_core::{
    client::Client,
    model::{CollectionModel, SearchResult},
    record::Record,
    schema::{FieldDescriptor, FieldSchema, FieldType, IndexDefinition, IndexSettings},
    coerce::CanonicalData,
    bulk::BulkItem,
    backend::{SearchBackend, SearchBackendBuilder},
    request::{BulkResponse, DeleteByQueryResponse, ReadOptions, Refresh, SearchBody, WriteOptions},
    sync::SyncState,
    error::{IndexStoreError, IndexStoreResult},
};
