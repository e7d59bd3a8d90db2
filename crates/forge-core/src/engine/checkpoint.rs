//! Checkpoint manager for resumable runs.
//!
//! Wraps a [`BoxSnapshotStore`] with the run-level operations the Smith
//! needs: record progress after each successful operation, load the
//! checkpoint a recovery attempt resumes from, and clear it once the run
//! completes.

use chrono::Utc;
use forge_types::error::PersistenceError;
use forge_types::snapshot::Snapshot;
use uuid::Uuid;

use super::compensation::CompletedOperation;
use super::definition::Workflow;
use super::foundry::Foundry;
use crate::persistence::BoxSnapshotStore;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Records and retrieves run checkpoints.
#[derive(Clone, Debug)]
pub struct CheckpointManager {
    store: BoxSnapshotStore,
}

impl CheckpointManager {
    pub fn new(store: BoxSnapshotStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &BoxSnapshotStore {
        &self.store
    }

    /// Persist progress after the operations in `completed` (a prefix of the
    /// workflow, in order). The last output is the input for the next one.
    pub async fn checkpoint(
        &self,
        foundry_id: Uuid,
        workflow_id: Uuid,
        workflow: &Workflow,
        foundry: &Foundry,
        completed: &[CompletedOperation],
    ) -> Result<Snapshot, PersistenceError> {
        let next_operation_index = completed.last().map_or(0, |done| done.index + 1);
        let snapshot = Snapshot {
            foundry_execution_id: foundry_id,
            workflow_id,
            workflow_name: workflow.name().to_string(),
            next_operation_index,
            properties: foundry.properties().clone(),
            last_output: completed.last().map(|done| done.output.clone()),
            completed_outputs: completed.iter().map(|done| done.output.clone()).collect(),
            saved_at: Utc::now(),
        };

        self.store.save(&snapshot).await?;

        tracing::debug!(
            foundry_id = %foundry_id,
            workflow_id = %workflow_id,
            next_operation_index,
            "checkpointed run progress"
        );

        Ok(snapshot)
    }

    /// Load the checkpoint for a key pair, if any.
    pub async fn load(
        &self,
        foundry_id: Uuid,
        workflow_id: Uuid,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        let snapshot = self.store.try_load(&foundry_id, &workflow_id).await?;
        if let Some(snapshot) = &snapshot {
            tracing::debug!(
                foundry_id = %foundry_id,
                workflow_id = %workflow_id,
                next_operation_index = snapshot.next_operation_index,
                "loaded checkpoint"
            );
        }
        Ok(snapshot)
    }

    /// Remove the checkpoint for a key pair.
    pub async fn clear(&self, foundry_id: Uuid, workflow_id: Uuid) -> Result<(), PersistenceError> {
        self.store.delete(&foundry_id, &workflow_id).await?;
        tracing::debug!(foundry_id = %foundry_id, workflow_id = %workflow_id, "cleared checkpoint");
        Ok(())
    }
}

/// Where a particular run writes its checkpoints.
#[derive(Clone, Debug)]
pub(crate) struct CheckpointTarget {
    pub manager: CheckpointManager,
    pub foundry_id: Uuid,
    pub workflow_id: Uuid,
}

impl CheckpointTarget {
    pub(crate) async fn save(
        &self,
        workflow: &Workflow,
        foundry: &Foundry,
        completed: &[CompletedOperation],
    ) -> Result<Snapshot, PersistenceError> {
        self.manager
            .checkpoint(self.foundry_id, self.workflow_id, workflow, foundry, completed)
            .await
    }

    pub(crate) async fn clear(&self) -> Result<(), PersistenceError> {
        self.manager.clear(self.foundry_id, self.workflow_id).await
    }
}

/// Operations a snapshot records as completed, with the outputs their
/// `restore` receives if the resumed run fails.
pub(crate) fn completed_prefix(snapshot: &Snapshot) -> Vec<CompletedOperation> {
    (0..snapshot.next_operation_index)
        .map(|index| CompletedOperation {
            index,
            output: snapshot.completed_output(index),
        })
        .collect()
}
