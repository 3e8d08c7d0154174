//! A thin document-mapping layer for Elasticsearch-compatible search stores.
//!
//! This crate is the core of the indexlayer project and provides:
//!
//! - **Field schemas** ([`schema`]) - Declared mapping types and index definitions
//! - **Coercion** ([`coerce`]) - Conversion of raw JSON into schema-shaped canonical data
//! - **Schema synchronization** ([`sync`]) - Lazy, exactly-once index bootstrap and reconciliation
//! - **Collection models and records** ([`model`], [`record`]) - Typed access to one index and its documents
//! - **Bulk compilation** ([`bulk`]) - Typed bulk intents flattened into the store's instruction stream
//! - **Store backend abstraction** ([`backend`]) - The trait remote stores implement
//! - **Client** ([`client`]) - Owner of the backend and the collection registry
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use indexlayer_core::{
//!     client::Client,
//!     request::WriteOptions,
//!     schema::{FieldDescriptor, FieldSchema, IndexDefinition},
//! };
//! use serde_json::json;
//!
//! let client = Client::new(backend);
//!
//! let posts = client.declare_collection(
//!     "posts",
//!     IndexDefinition::new(
//!         FieldSchema::new()
//!             .field("title", FieldDescriptor::text())
//!             .field("published", FieldDescriptor::date()),
//!     ),
//! )?;
//!
//! // The first remote operation creates the index.
//! posts
//!     .record("1", json!({ "title": "Hello", "published": "2024-01-01T10:00:00+02:00" }))?
//!     .create(&WriteOptions::default())
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as indexlayer_core;

pub mod backend;
pub mod bulk;
pub mod client;
pub mod coerce;
pub mod error;
pub mod model;
pub mod record;
pub mod request;
pub mod schema;
pub mod sync;
