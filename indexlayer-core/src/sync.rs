//! Lazy, exactly-once schema synchronization for collection models.
//!
//! Before a collection model touches the remote store it calls
//! [`SchemaSynchronizer::ensure_synced`]. The first caller bootstraps the remote index
//! (create it, or reconcile settings and mappings with the declared definition); every
//! later caller returns immediately.
//!
//! Bootstrap attempts are serialized by an async mutex. The caller holding it is the
//! only one that talks to the store; the others wait on the lock without blocking a
//! thread and re-check the state once they get it. A failed attempt leaves the state
//! `Unsynced`, so the next waiter in line (or the next operation) starts a new attempt.
//! Only the caller whose attempt failed sees the error.

use futures::future::try_join_all;
use mea::mutex::Mutex;
use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};
use tracing::{debug, info, warn};

use crate::{
    backend::SearchBackend,
    error::{IndexStoreError, IndexStoreResult},
    request::IndexInfo,
    schema::{FieldDescriptor, IndexDefinition},
};

const UNSYNCED: u8 = 0;
const SYNCHRONIZING: u8 = 1;
const SYNCED: u8 = 2;

/// Synchronization state of a collection model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No successful bootstrap yet, or the last attempt failed.
    Unsynced,
    /// A bootstrap attempt is in flight.
    Synchronizing,
    /// The remote index matches the declared definition.
    Synced,
}

impl From<u8> for SyncState {
    fn from(value: u8) -> Self {
        match value {
            SYNCED => SyncState::Synced,
            SYNCHRONIZING => SyncState::Synchronizing,
            _ => SyncState::Unsynced,
        }
    }
}

/// Owner of a collection model's synchronization state.
pub struct SchemaSynchronizer {
    state: AtomicU8,
    bootstrap: Mutex<()>,
}

impl SchemaSynchronizer {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNSYNCED),
            bootstrap: Mutex::new(()),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        SyncState::from(self.state.load(Ordering::Acquire))
    }

    /// Ensures the remote index exists and matches `definition`.
    ///
    /// Returns immediately once synchronized. Otherwise waits for any in-flight
    /// attempt and, if the index is still not synchronized, performs the bootstrap.
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::SchemaBootstrap`] if this caller's attempt failed.
    /// The state is reset so that a later call retries.
    pub async fn ensure_synced<B>(
        &self,
        backend: &B,
        index: &str,
        definition: &IndexDefinition,
    ) -> IndexStoreResult<()>
    where
        B: SearchBackend + ?Sized,
    {
        if self.state() == SyncState::Synced {
            return Ok(());
        }

        let _guard = self.bootstrap.lock().await;

        // The attempt we waited on may have succeeded.
        if self.state() == SyncState::Synced {
            return Ok(());
        }

        let mut attempt = Attempt::claim(&self.state);

        match bootstrap(backend, index, definition).await {
            Ok(()) => {
                attempt.succeed();
                Ok(())
            }
            Err(err) => {
                warn!(index, error = %err, "schema bootstrap failed");
                Err(IndexStoreError::bootstrap(index, err))
            }
        }
    }
}

impl Default for SchemaSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SchemaSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaSynchronizer")
            .field("state", &self.state())
            .finish()
    }
}

/// An in-flight bootstrap attempt.
///
/// Dropping it without calling [`Attempt::succeed`] (on failure, or when the caller's
/// future is cancelled) puts the state back to `Unsynced`.
struct Attempt<'a> {
    state: &'a AtomicU8,
    succeeded: bool,
}

impl<'a> Attempt<'a> {
    fn claim(state: &'a AtomicU8) -> Self {
        state.store(SYNCHRONIZING, Ordering::Release);
        Self { state, succeeded: false }
    }

    fn succeed(&mut self) {
        self.succeeded = true;
        self.state.store(SYNCED, Ordering::Release);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.succeeded {
            self.state.store(UNSYNCED, Ordering::Release);
        }
    }
}

/// Creates the remote index, or reconciles it if it already exists.
async fn bootstrap<B>(backend: &B, index: &str, definition: &IndexDefinition) -> IndexStoreResult<()>
where
    B: SearchBackend + ?Sized,
{
    debug!(index, "bootstrapping index");

    let info = match backend.get_index(index).await {
        Ok(info) => info,
        Err(err) if err.is_index_not_found() => {
            backend.create_index(index, definition).await?;
            info!(index, "created index");

            return Ok(());
        }
        Err(err) => return Err(err),
    };

    reconcile(backend, index, definition, &info).await
}

async fn reconcile<B>(
    backend: &B,
    index: &str,
    definition: &IndexDefinition,
    info: &IndexInfo,
) -> IndexStoreResult<()>
where
    B: SearchBackend + ?Sized,
{
    let settings = definition.mutable_index_settings();
    let settings_count = settings.len();

    if !settings.is_empty() {
        debug!(index, settings = settings_count, "updating index settings");
        backend.put_settings(index, settings).await?;
    }

    let changed = changed_fields(definition, info)?;

    try_join_all(changed.iter().map(|(field, descriptor)| {
        debug!(index, field = %field, "extending mapping");
        backend.put_mapping(index, field, descriptor)
    }))
    .await?;

    info!(
        index,
        settings = settings_count,
        fields = changed.len(),
        "reconciled index"
    );

    Ok(())
}

/// Returns the declared top-level fields whose mapping differs from the store's.
pub(crate) fn changed_fields<'a>(
    definition: &'a IndexDefinition,
    info: &IndexInfo,
) -> IndexStoreResult<Vec<(&'a str, &'a FieldDescriptor)>> {
    let mut changed = Vec::new();

    for (field, descriptor) in definition.schema() {
        if info.field_mapping(field) != Some(&descriptor.to_value()?) {
            changed.push((field.as_str(), descriptor));
        }
    }

    Ok(changed)
}
