//! SQLite snapshot store implementation.
//!
//! Implements `SnapshotStore` from `forge-core` using sqlx with split
//! read/write pools. Properties and outputs are stored as JSON text.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use forge_core::persistence::SnapshotStore;
use forge_types::error::PersistenceError;
use forge_types::snapshot::Snapshot;
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SnapshotStore`.
#[derive(Clone, Debug)]
pub struct SqliteSnapshotStore {
    pool: DatabasePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SnapshotRow {
    foundry_id: String,
    workflow_id: String,
    workflow_name: String,
    next_operation_index: i64,
    properties: String,
    last_output: Option<String>,
    completed_outputs: String,
    saved_at: String,
}

impl SnapshotRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            foundry_id: row.try_get("foundry_id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_name: row.try_get("workflow_name")?,
            next_operation_index: row.try_get("next_operation_index")?,
            properties: row.try_get("properties")?,
            last_output: row.try_get("last_output")?,
            completed_outputs: row.try_get("completed_outputs")?,
            saved_at: row.try_get("saved_at")?,
        })
    }

    fn into_snapshot(self) -> Result<Snapshot, PersistenceError> {
        let properties: HashMap<String, Value> = serde_json::from_str(&self.properties)?;
        let last_output = self
            .last_output
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?;
        let completed_outputs: Vec<Value> = serde_json::from_str(&self.completed_outputs)?;
        let next_operation_index = usize::try_from(self.next_operation_index).map_err(|_| {
            PersistenceError::Query(format!(
                "invalid next_operation_index: {}",
                self.next_operation_index
            ))
        })?;

        Ok(Snapshot {
            foundry_execution_id: parse_uuid(&self.foundry_id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            workflow_name: self.workflow_name,
            next_operation_index,
            properties,
            last_output,
            completed_outputs,
            saved_at: parse_datetime(&self.saved_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, PersistenceError> {
    Uuid::parse_str(s).map_err(|e| PersistenceError::Query(format!("invalid uuid '{s}': {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Query(format!("invalid datetime: {e}")))
}

fn query_error(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// SnapshotStore implementation
// ---------------------------------------------------------------------------

impl SnapshotStore for SqliteSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let properties = serde_json::to_string(&snapshot.properties)?;
        let last_output = snapshot
            .last_output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let completed_outputs = serde_json::to_string(&snapshot.completed_outputs)?;
        let next_operation_index = i64::try_from(snapshot.next_operation_index).map_err(|_| {
            PersistenceError::Query("next_operation_index out of range".to_string())
        })?;

        sqlx::query(
            r#"INSERT INTO snapshots
                   (foundry_id, workflow_id, workflow_name, next_operation_index, properties, last_output, completed_outputs, saved_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (foundry_id, workflow_id) DO UPDATE SET
                   workflow_name = excluded.workflow_name,
                   next_operation_index = excluded.next_operation_index,
                   properties = excluded.properties,
                   last_output = excluded.last_output,
                   completed_outputs = excluded.completed_outputs,
                   saved_at = excluded.saved_at"#,
        )
        .bind(snapshot.foundry_execution_id.to_string())
        .bind(snapshot.workflow_id.to_string())
        .bind(&snapshot.workflow_name)
        .bind(next_operation_index)
        .bind(&properties)
        .bind(last_output.as_deref())
        .bind(&completed_outputs)
        .bind(snapshot.saved_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn try_load(
        &self,
        foundry_id: &Uuid,
        workflow_id: &Uuid,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM snapshots WHERE foundry_id = ? AND workflow_id = ?")
            .bind(foundry_id.to_string())
            .bind(workflow_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let row = SnapshotRow::from_row(&row).map_err(query_error)?;
                Ok(Some(row.into_snapshot()?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, foundry_id: &Uuid, workflow_id: &Uuid) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM snapshots WHERE foundry_id = ? AND workflow_id = ?")
            .bind(foundry_id.to_string())
            .bind(workflow_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Snapshot>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM snapshots ORDER BY saved_at DESC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = SnapshotRow::from_row(row).map_err(query_error)?;
            snapshots.push(row.into_snapshot()?);
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> SqliteSnapshotStore {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open_in(dir.path()).await.unwrap();
        std::mem::forget(dir);
        SqliteSnapshotStore::new(pool)
    }

    fn snapshot(next: usize) -> Snapshot {
        Snapshot {
            foundry_execution_id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            workflow_name: "checkout".to_string(),
            next_operation_index: next,
            properties: HashMap::from([
                ("progress".to_string(), json!(next)),
                ("tags".to_string(), json!(["a", "b"])),
            ]),
            last_output: Some(json!({ "order": "A-17" })),
            completed_outputs: (0..next).map(|i| json!({ "step": i })).collect(),
            saved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let store = test_store().await;
        let snap = snapshot(2);

        store.save(&snap).await.unwrap();
        let loaded = store
            .try_load(&snap.foundry_execution_id, &snap.workflow_id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.next_operation_index, 2);
        assert_eq!(loaded.properties, snap.properties);
        assert_eq!(loaded.last_output, snap.last_output);
        assert_eq!(loaded.completed_outputs, snap.completed_outputs);
        assert_eq!(loaded.saved_at, snap.saved_at);
    }

    #[tokio::test]
    async fn save_upserts() {
        let store = test_store().await;
        let mut snap = snapshot(1);
        store.save(&snap).await.unwrap();

        snap.next_operation_index = 3;
        snap.last_output = None;
        store.save(&snap).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].next_operation_index, 3);
        assert!(listed[0].last_output.is_none());
    }

    #[tokio::test]
    async fn delete_and_missing() {
        let store = test_store().await;
        let snap = snapshot(1);
        store.save(&snap).await.unwrap();
        store.delete(&snap.foundry_execution_id, &snap.workflow_id).await.unwrap();

        assert!(store
            .try_load(&snap.foundry_execution_id, &snap.workflow_id)
            .await
            .unwrap()
            .is_none());
        store.delete(&Uuid::nil(), &Uuid::nil()).await.unwrap();
    }
}
