//! Filesystem snapshot store.
//!
//! One pretty-printed JSON document per key pair:
//!
//! ```text
//! {base_dir}/
//!   {foundry_id}__{workflow_id}.json
//! ```
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a crash
//! mid-write never leaves a truncated snapshot behind. A failed write removes
//! its `.tmp` file.

use std::path::{Path, PathBuf};

use forge_core::persistence::SnapshotStore;
use forge_types::error::PersistenceError;
use forge_types::snapshot::Snapshot;
use uuid::Uuid;

const EXTENSION: &str = "json";

/// Directory-backed `SnapshotStore`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    base_dir: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store rooted at `base_dir`. The directory is created on first save.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn snapshot_path(&self, foundry_id: &Uuid, workflow_id: &Uuid) -> PathBuf {
        self.base_dir
            .join(format!("{foundry_id}__{workflow_id}.{EXTENSION}"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let path = self.snapshot_path(&snapshot.foundry_execution_id, &snapshot.workflow_id);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let body = serde_json::to_vec_pretty(snapshot)?;

        let written = match tokio::fs::write(&tmp, body).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            discard_temp(&tmp).await;
            return Err(e.into());
        }

        tracing::trace!(path = %path.display(), "snapshot written");
        Ok(())
    }

    async fn try_load(
        &self,
        foundry_id: &Uuid,
        workflow_id: &Uuid,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        let path = self.snapshot_path(foundry_id, workflow_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn delete(&self, foundry_id: &Uuid, workflow_id: &Uuid) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(self.snapshot_path(foundry_id, workflow_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Snapshot>, PersistenceError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let body = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<Snapshot>(&body) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }

        snapshots.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(snapshots)
    }
}

async fn discard_temp(tmp: &Path) {
    match tokio::fs::remove_file(tmp).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temp snapshot"),
    }
}
