//! Snapshot store trait.

use forge_types::error::PersistenceError;
use forge_types::snapshot::Snapshot;
use uuid::Uuid;

/// Durable storage for run snapshots, keyed by (foundry id, workflow id).
///
/// At most one snapshot exists per key pair; `save` replaces it. Uses RPITIT
/// (native async fn in traits, Rust 2024 edition).
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace the snapshot for its key pair.
    fn save(
        &self,
        snapshot: &Snapshot,
    ) -> impl std::future::Future<Output = Result<(), PersistenceError>> + Send;

    /// Load the snapshot for a key pair. Returns None if there is none.
    fn try_load(
        &self,
        foundry_id: &Uuid,
        workflow_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Snapshot>, PersistenceError>> + Send;

    /// Delete the snapshot for a key pair. No-op if it does not exist.
    fn delete(
        &self,
        foundry_id: &Uuid,
        workflow_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), PersistenceError>> + Send;

    /// List every stored snapshot, most recently saved first.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Snapshot>, PersistenceError>> + Send;
}
