//! Checkpoint record for resumable workflow runs.
//!
//! A `Snapshot` captures how far a run got (`next_operation_index`), the
//! output of every operation completed so far and the Foundry properties at
//! that point. Property values are JSON values, so
//! a snapshot round-trips every property exactly through any store that
//! persists the serialized document.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Persisted progress of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Execution id of the Foundry that produced this checkpoint.
    pub foundry_execution_id: Uuid,
    /// Workflow id (or stable workflow key when driven by recovery).
    pub workflow_id: Uuid,
    /// Workflow name at the time of the checkpoint.
    pub workflow_name: String,
    /// Index of the next operation to execute.
    pub next_operation_index: usize,
    /// Copy of the Foundry properties at the checkpoint.
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    /// Output of operation `next_operation_index - 1`, fed to the resumed operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<Value>,
    /// Outputs of operations `0..next_operation_index`, in order. A resumed
    /// run that fails hands these back to each operation's `restore`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_outputs: Vec<Value>,
    /// When the checkpoint was written.
    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    /// Check the snapshot against the workflow it is about to resume.
    ///
    /// Returns a human-readable reason when `next_operation_index` is out of
    /// range for a workflow with `operation_count` operations.
    pub fn validate(&self, operation_count: usize) -> Result<(), String> {
        if self.next_operation_index > operation_count {
            return Err(format!(
                "snapshot for '{}' resumes at operation {} but the workflow has only {} operation(s)",
                self.workflow_name, self.next_operation_index, operation_count
            ));
        }
        if !self.completed_outputs.is_empty()
            && self.completed_outputs.len() != self.next_operation_index
        {
            return Err(format!(
                "snapshot for '{}' records {} output(s) for {} completed operation(s)",
                self.workflow_name,
                self.completed_outputs.len(),
                self.next_operation_index
            ));
        }
        Ok(())
    }

    /// Output recorded for completed operation `index`.
    ///
    /// Snapshots without `completed_outputs` only know the last output; the
    /// other operations get `Value::Null`.
    pub fn completed_output(&self, index: usize) -> Value {
        if let Some(output) = self.completed_outputs.get(index) {
            return output.clone();
        }
        match &self.last_output {
            Some(output) if index + 1 == self.next_operation_index => output.clone(),
            _ => Value::Null,
        }
    }

    /// Whether the checkpoint marks a run with nothing left to execute.
    pub fn is_finished(&self, operation_count: usize) -> bool {
        self.next_operation_index >= operation_count
    }
}
