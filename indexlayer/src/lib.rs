//! Main indexlayer crate: a thin document-mapping layer for Elasticsearch-compatible stores.
//!
//! This crate is the primary entry point for users of the indexlayer framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! access to the different search backends.
//!
//! # Features
//!
//! - **Declared schemas** - Describe fields once; they drive both coercion and the remote mapping
//! - **Lazy bootstrap** - Indices are created or reconciled on first use, exactly once
//! - **Coerced records** - Undeclared fields are dropped, declared ones converted to their mapping type
//! - **Bulk compilation** - Create, update and delete intents become one bulk request
//! - **Multiple backends** - In-memory for tests, HTTP for real servers
//!
//! # Quick Start
//!
//! ```ignore
//! use indexlayer::{prelude::*, memory::InMemorySearchStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> IndexStoreResult<()> {
//!     let client = Client::new(InMemorySearchStore::builder().build().await?);
//!
//!     let posts = client.declare_collection(
//!         "posts",
//!         IndexDefinition::new(
//!             FieldSchema::new()
//!                 .field("title", FieldDescriptor::text())
//!                 .field("views", FieldDescriptor::long()),
//!         ),
//!     )?;
//!
//!     // The index is created by the first operation.
//!     posts
//!         .record("1", json!({ "title": "Hello", "views": "3", "draft": true }))?
//!         .create(&WriteOptions::default())
//!         .await?;
//!
//!     let post = posts.get("1").await?.unwrap();
//!     assert_eq!(post.to_canonical_data(), json!({ "title": "Hello", "views": 3 }).as_object().cloned().unwrap());
//!
//!     let result = posts
//!         .search(
//!             SearchBody::new().query(json!({ "match": { "title": "hello" } })),
//!             &ReadOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("{} hits", result.total);
//!
//!     client.shutdown().await
//! }
//! ```
//!
//! # Bulk Requests
//!
//! ```ignore
//! use indexlayer::prelude::*;
//! use serde_json::json;
//!
//! let response = posts
//!     .bulk(
//!         &[
//!             BulkItem::create("2", json!({ "title": "Second" })),
//!             BulkItem::update("1", json!({ "views": 4 })),
//!             BulkItem::delete("3"),
//!         ],
//!         &WriteOptions::new().refresh(Refresh::WaitFor),
//!     )
//!     .await?;
//!
//! if response.errors {
//!     eprintln!("some items failed: {:?}", response.items);
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`elasticsearch`] - HTTP backend for Elasticsearch-compatible servers (requires `elasticsearch` feature)

pub mod prelude;

pub use indexlayer_core::{backend, bulk, client, coerce, error, model, record, request, schema, sync};

// Re-export for implementing custom backends.
pub use async_trait::async_trait;

/// In-memory search backend implementations.
pub mod memory {
    pub use indexlayer_memory::{InMemorySearchStore, InMemorySearchStoreBuilder};
}

/// Elasticsearch search backend implementations.
///
/// This module is only available when the `elasticsearch` feature is enabled.
#[cfg(feature = "elasticsearch")]
pub mod elasticsearch {
    pub use indexlayer_elasticsearch::{ElasticsearchStore, ElasticsearchStoreBuilder, DEFAULT_URL};
}
