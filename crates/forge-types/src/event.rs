//! Event types for the Forge event bus.
//!
//! `ForgeEvent` is the unified event type broadcast while a workflow runs.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during workflow execution, compensation and recovery.
///
/// `execution_id` is the Foundry execution id of the run that emitted the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForgeEvent {
    /// A run started (or resumed at `start_index`).
    RunStarted {
        execution_id: Uuid,
        workflow_name: String,
        operation_count: usize,
        start_index: usize,
    },

    /// An operation is about to be invoked through its middleware chain.
    OperationStarted {
        execution_id: Uuid,
        index: usize,
        operation: String,
    },

    /// An operation returned successfully.
    OperationCompleted {
        execution_id: Uuid,
        index: usize,
        operation: String,
        duration_ms: u64,
    },

    /// An operation (or a middleware wrapping it) failed.
    OperationFailed {
        execution_id: Uuid,
        index: usize,
        operation: String,
        error: String,
    },

    /// Progress was checkpointed.
    CheckpointSaved {
        execution_id: Uuid,
        workflow_id: Uuid,
        next_operation_index: usize,
    },

    /// Backward compensation started over `pending` completed operations.
    CompensationStarted {
        execution_id: Uuid,
        failed_index: usize,
        pending: usize,
    },

    /// An operation's compensating action succeeded.
    OperationRestored {
        execution_id: Uuid,
        index: usize,
        operation: String,
    },

    /// An operation's compensating action failed.
    RestoreFailed {
        execution_id: Uuid,
        index: usize,
        operation: String,
        error: String,
    },

    /// Compensation finished.
    CompensationFinished {
        execution_id: Uuid,
        restored: usize,
        failed: usize,
        skipped: usize,
    },

    /// The run completed all of its operations.
    RunCompleted {
        execution_id: Uuid,
        workflow_name: String,
        duration_ms: u64,
    },

    /// The run failed.
    RunFailed {
        execution_id: Uuid,
        workflow_name: String,
        error: String,
    },

    /// A recovery attempt is starting.
    RecoveryAttemptStarted {
        execution_id: Uuid,
        attempt: u32,
        max_attempts: u32,
        resume_index: usize,
    },

    /// A recovery attempt failed. `will_retry` distinguishes transient from final failures.
    RecoveryAttemptFailed {
        execution_id: Uuid,
        attempt: u32,
        error: String,
        will_retry: bool,
        retry_in_ms: Option<u64>,
    },
}

impl ForgeEvent {
    /// Execution id carried by every variant.
    pub fn execution_id(&self) -> Uuid {
        match self {
            ForgeEvent::RunStarted { execution_id, .. }
            | ForgeEvent::OperationStarted { execution_id, .. }
            | ForgeEvent::OperationCompleted { execution_id, .. }
            | ForgeEvent::OperationFailed { execution_id, .. }
            | ForgeEvent::CheckpointSaved { execution_id, .. }
            | ForgeEvent::CompensationStarted { execution_id, .. }
            | ForgeEvent::OperationRestored { execution_id, .. }
            | ForgeEvent::RestoreFailed { execution_id, .. }
            | ForgeEvent::CompensationFinished { execution_id, .. }
            | ForgeEvent::RunCompleted { execution_id, .. }
            | ForgeEvent::RunFailed { execution_id, .. }
            | ForgeEvent::RecoveryAttemptStarted { execution_id, .. }
            | ForgeEvent::RecoveryAttemptFailed { execution_id, .. } => *execution_id,
        }
    }
}
