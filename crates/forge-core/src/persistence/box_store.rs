//! BoxSnapshotStore -- object-safe dynamic dispatch wrapper for SnapshotStore.
//!
//! 1. `SnapshotStoreDyn` is an object-safe trait with boxed futures
//! 2. Blanket impl of `SnapshotStoreDyn` for all `T: SnapshotStore`
//! 3. `BoxSnapshotStore` wraps `Arc<dyn SnapshotStoreDyn>` and delegates
//!
//! The wrapper is `Clone` so a Smith, its run plans and the recovery driver
//! can all hold the same backend.

use std::sync::Arc;

use forge_types::error::PersistenceError;
use forge_types::snapshot::Snapshot;
use uuid::Uuid;

use super::snapshot_store::SnapshotStore;
use crate::engine::BoxFuture;

/// Object-safe version of [`SnapshotStore`].
pub trait SnapshotStoreDyn: Send + Sync {
    fn save_boxed<'a>(&'a self, snapshot: &'a Snapshot) -> BoxFuture<'a, Result<(), PersistenceError>>;

    fn try_load_boxed<'a>(
        &'a self,
        foundry_id: &'a Uuid,
        workflow_id: &'a Uuid,
    ) -> BoxFuture<'a, Result<Option<Snapshot>, PersistenceError>>;

    fn delete_boxed<'a>(
        &'a self,
        foundry_id: &'a Uuid,
        workflow_id: &'a Uuid,
    ) -> BoxFuture<'a, Result<(), PersistenceError>>;

    fn list_boxed(&self) -> BoxFuture<'_, Result<Vec<Snapshot>, PersistenceError>>;
}

impl<T: SnapshotStore> SnapshotStoreDyn for T {
    fn save_boxed<'a>(&'a self, snapshot: &'a Snapshot) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(self.save(snapshot))
    }

    fn try_load_boxed<'a>(
        &'a self,
        foundry_id: &'a Uuid,
        workflow_id: &'a Uuid,
    ) -> BoxFuture<'a, Result<Option<Snapshot>, PersistenceError>> {
        Box::pin(self.try_load(foundry_id, workflow_id))
    }

    fn delete_boxed<'a>(
        &'a self,
        foundry_id: &'a Uuid,
        workflow_id: &'a Uuid,
    ) -> BoxFuture<'a, Result<(), PersistenceError>> {
        Box::pin(self.delete(foundry_id, workflow_id))
    }

    fn list_boxed(&self) -> BoxFuture<'_, Result<Vec<Snapshot>, PersistenceError>> {
        Box::pin(self.list())
    }
}

/// Type-erased snapshot store for runtime backend selection.
#[derive(Clone)]
pub struct BoxSnapshotStore {
    inner: Arc<dyn SnapshotStoreDyn>,
}

impl BoxSnapshotStore {
    pub fn new<T: SnapshotStore + 'static>(store: T) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.inner.save_boxed(snapshot).await
    }

    pub async fn try_load(
        &self,
        foundry_id: &Uuid,
        workflow_id: &Uuid,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        self.inner.try_load_boxed(foundry_id, workflow_id).await
    }

    pub async fn delete(&self, foundry_id: &Uuid, workflow_id: &Uuid) -> Result<(), PersistenceError> {
        self.inner.delete_boxed(foundry_id, workflow_id).await
    }

    pub async fn list(&self) -> Result<Vec<Snapshot>, PersistenceError> {
        self.inner.list_boxed().await
    }
}

impl std::fmt::Debug for BoxSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxSnapshotStore").finish_non_exhaustive()
    }
}
