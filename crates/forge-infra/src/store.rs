//! Snapshot store selection.
//!
//! Maps a [`StoreKind`] (as chosen on the command line) to a concrete
//! backend wrapped in a [`BoxSnapshotStore`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use forge_core::persistence::BoxSnapshotStore;
use forge_types::error::PersistenceError;

use crate::file::FileSnapshotStore;
use crate::memory::InMemorySnapshotStore;
use crate::sqlite::{DatabasePool, SqliteSnapshotStore};

/// Available snapshot backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// Process-local; nothing survives exit.
    #[default]
    Memory,
    /// JSON files under `{data_dir}/snapshots/`.
    File,
    /// `{data_dir}/forge.db`.
    Sqlite,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreKind::Memory => "memory",
            StoreKind::File => "file",
            StoreKind::Sqlite => "sqlite",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "file" => Ok(StoreKind::File),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(format!(
                "invalid store '{other}' (expected memory, file or sqlite)"
            )),
        }
    }
}

/// Open the snapshot store of `kind` rooted in `data_dir`.
pub async fn open_store(kind: StoreKind, data_dir: &Path) -> Result<BoxSnapshotStore, PersistenceError> {
    let store = match kind {
        StoreKind::Memory => BoxSnapshotStore::new(InMemorySnapshotStore::new()),
        StoreKind::File => BoxSnapshotStore::new(FileSnapshotStore::new(data_dir.join("snapshots"))),
        StoreKind::Sqlite => {
            let pool = DatabasePool::open_in(data_dir)
                .await
                .map_err(|e| PersistenceError::Connection(e.to_string()))?;
            BoxSnapshotStore::new(SqliteSnapshotStore::new(pool))
        }
    };
    tracing::debug!(store = %kind, data_dir = %data_dir.display(), "opened snapshot store");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_types::snapshot::Snapshot;
    use uuid::Uuid;

    #[test]
    fn store_kind_parses() {
        assert_eq!("SQLite".parse::<StoreKind>().unwrap(), StoreKind::Sqlite);
        assert_eq!(StoreKind::File.to_string(), "file");
        assert!("redis".parse::<StoreKind>().is_err());
    }

    #[tokio::test]
    async fn every_backend_roundtrips_through_box() {
        let tmp = tempfile::tempdir().unwrap();
        for kind in [StoreKind::Memory, StoreKind::File, StoreKind::Sqlite] {
            let store = open_store(kind, tmp.path()).await.unwrap();
            let snapshot = Snapshot {
                foundry_execution_id: Uuid::now_v7(),
                workflow_id: Uuid::now_v7(),
                workflow_name: format!("wf-{kind}"),
                next_operation_index: 1,
                properties: Default::default(),
                last_output: None,
                completed_outputs: Vec::new(),
                saved_at: Utc::now(),
            };

            store.save(&snapshot).await.unwrap();
            let loaded = store
                .try_load(&snapshot.foundry_execution_id, &snapshot.workflow_id)
                .await
                .unwrap();
            assert_eq!(loaded.map(|s| s.workflow_name), Some(format!("wf-{kind}")));
            store
                .delete(&snapshot.foundry_execution_id, &snapshot.workflow_id)
                .await
                .unwrap();
        }
    }
}
