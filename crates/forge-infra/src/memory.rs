//! In-process snapshot store.
//!
//! Implements `SnapshotStore` from `forge-core` on a `DashMap`. Snapshots
//! live as long as the store (or any clone of it) does; useful for tests and
//! for recovery within a single process.

use std::sync::Arc;

use dashmap::DashMap;
use forge_core::persistence::SnapshotStore;
use forge_types::error::PersistenceError;
use forge_types::snapshot::Snapshot;
use uuid::Uuid;

/// Concurrent in-memory `SnapshotStore`. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<DashMap<(Uuid, Uuid), Snapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        self.snapshots.insert(
            (snapshot.foundry_execution_id, snapshot.workflow_id),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn try_load(
        &self,
        foundry_id: &Uuid,
        workflow_id: &Uuid,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        Ok(self
            .snapshots
            .get(&(*foundry_id, *workflow_id))
            .map(|entry| entry.value().clone()))
    }

    async fn delete(&self, foundry_id: &Uuid, workflow_id: &Uuid) -> Result<(), PersistenceError> {
        self.snapshots.remove(&(*foundry_id, *workflow_id));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Snapshot>, PersistenceError> {
        let mut snapshots: Vec<Snapshot> = self
            .snapshots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        snapshots.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(snapshots)
    }
}

impl std::fmt::Debug for InMemorySnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySnapshotStore")
            .field("len", &self.snapshots.len())
            .finish()
    }
}
