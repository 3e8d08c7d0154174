//! Elasticsearch backend implementation for indexlayer.
//!
//! This crate provides an HTTP implementation of the `SearchBackend` trait for
//! Elasticsearch-compatible servers, built on `reqwest`.
//!
//! To use this backend, include the `elasticsearch` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! indexlayer = { version = "x.y.z", features = ["elasticsearch"] }
//! ```
//!
//! # Features
//!
//! - **REST mapping** - Each backend operation is one request to the matching endpoint
//! - **Error envelopes** - Missing indices, missing documents and conflicts are told apart
//! - **NDJSON bulk** - Compiled bulk instructions are streamed as newline-delimited JSON
//! - **Basic auth and timeouts** - Configured through the builder or the environment
//!
//! # Connection
//!
//! The builder takes the server URL. [`ElasticsearchStoreBuilder::from_env`] reads it
//! from `ELASTICSEARCH_URI` along with optional credentials and timeout.
//!
//! # Example
//!
//! ```ignore
//! use indexlayer::{backend::SearchBackendBuilder, elasticsearch::ElasticsearchStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ElasticsearchStoreBuilder::from_env()?
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as indexlayer_elasticsearch;

pub mod store;
mod wire;

pub use store::{ElasticsearchStore, ElasticsearchStoreBuilder, DEFAULT_URL};
