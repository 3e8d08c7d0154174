//! In-memory search backend for indexlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `SearchBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and testing of code that talks to an Elasticsearch-compatible store.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Store semantics** - Create conflicts, missing-document errors, static settings rejection
//! - **Query DSL subset** - `match_all`, `term`, `terms`, `range` and `bool`
//! - **Sorting and paging** - `sort` and `from`/`size`; aggregations are rejected
//!
//! # Quick Start
//!
//! ```ignore
//! use indexlayer::{prelude::*, memory::InMemorySearchStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemorySearchStore::builder().build().await?;
//!     let client = Client::new(backend);
//!
//!     let users = client.declare_collection(
//!         "users",
//!         IndexDefinition::new(FieldSchema::new().field("name", FieldDescriptor::keyword())),
//!     )?;
//!
//!     users
//!         .record("1", json!({ "name": "Alice" }))?
//!         .create(&WriteOptions::default())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as indexlayer_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemorySearchStore, InMemorySearchStoreBuilder};
