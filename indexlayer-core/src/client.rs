//! Client: owner of the backend and the registry of declared collections.
//!
//! # Example
//!
//! ```ignore
//! use indexlayer::prelude::*;
//! use indexlayer::memory::InMemorySearchStore;
//!
//! let client = Client::new(InMemorySearchStore::new());
//!
//! let posts = client.declare_collection(
//!     "posts",
//!     IndexDefinition::new(
//!         FieldSchema::new()
//!             .field("title", FieldDescriptor::text())
//!             .field("views", FieldDescriptor::long()),
//!     ),
//! )?;
//!
//! assert!(client.collection("posts").is_some());
//! ```

use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

use crate::{
    backend::SearchBackend,
    error::{IndexStoreError, IndexStoreResult},
    model::CollectionModel,
    schema::IndexDefinition,
};

/// Entry point of the mapping layer.
///
/// A client wraps one backend and hands out [`CollectionModel`]s that share it.
/// Declaring a collection is purely local: the remote index is only touched by the
/// first operation that needs it.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
pub struct Client<B: SearchBackend> {
    backend: Arc<B>,
    collections: RwLock<HashMap<String, CollectionModel<B>>>,
}

impl<B: SearchBackend> Client<B> {
    /// Creates a new client with the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the backend shared by every collection of this client.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Declares a collection and returns its model.
    ///
    /// # Arguments
    ///
    /// * `name` - The remote index name
    /// * `definition` - Settings, mappings and aliases the index should have
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::InvalidSchema`] if the name or the field schema is not
    /// usable, and [`IndexStoreError::CollectionAlreadyDeclared`] if a collection with
    /// the same name was declared before on this client.
    pub fn declare_collection(
        &self,
        name: impl Into<String>,
        definition: IndexDefinition,
    ) -> IndexStoreResult<CollectionModel<B>> {
        let name = name.into();

        validate_index_name(&name)?;
        definition.schema().validate()?;

        let mut collections = self.collections.write();

        if collections.contains_key(&name) {
            return Err(IndexStoreError::CollectionAlreadyDeclared(name));
        }

        let model = CollectionModel::new(name.clone(), definition, Arc::clone(&self.backend));
        collections.insert(name.clone(), model.clone());

        debug!(index = %name, "declared collection");

        Ok(model)
    }

    /// Gets a previously declared collection by name.
    pub fn collection(&self, name: &str) -> Option<CollectionModel<B>> {
        self.collections.read().get(name).cloned()
    }

    /// Lists the names of all declared collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names = self
            .collections
            .read()
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();
        names
    }

    /// Shuts down the backend.
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::Backend`] if collection models or records handed out by
    /// this client are still alive, since they share the backend.
    pub async fn shutdown(self) -> IndexStoreResult<()> {
        drop(self.collections);

        match Arc::try_unwrap(self.backend) {
            Ok(backend) => backend.shutdown().await,
            Err(_) => Err(IndexStoreError::Backend(
                "backend is still in use by live collection models".to_string(),
            )),
        }
    }
}

impl<B: SearchBackend> fmt::Debug for Client<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend)
            .field("collections", &self.collection_names())
            .finish()
    }
}

/// Index names must be non-empty, lowercase, and must not start with `_`, `-` or `+`.
fn validate_index_name(name: &str) -> IndexStoreResult<()> {
    if name.is_empty() {
        return Err(IndexStoreError::InvalidSchema("index name must not be empty".to_string()));
    }

    if name.starts_with(['_', '-', '+']) {
        return Err(IndexStoreError::InvalidSchema(format!(
            "index name `{name}` must not start with `_`, `-` or `+`"
        )));
    }

    if name.chars().any(|c| c.is_uppercase() || c.is_whitespace() || "\\/*?\"<>|,#:".contains(c)) {
        return Err(IndexStoreError::InvalidSchema(format!(
            "index name `{name}` must be lowercase and must not contain whitespace or any of \\/*?\"<>|,#:"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_names_are_validated() {
        assert!(validate_index_name("posts").is_ok());
        assert!(validate_index_name("posts-2024.01").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name("Posts").is_err());
        assert!(validate_index_name("_posts").is_err());
        assert!(validate_index_name("my posts").is_err());
        assert!(validate_index_name("a*b").is_err());
    }
}
