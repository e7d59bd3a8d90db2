//! Recovery driver: resume checkpointed runs with retry and backoff.
//!
//! Each attempt loads the snapshot for a stable (foundry, workflow) key pair,
//! resets the Foundry's properties to what the caller passed in, overlays the
//! snapshot's properties and continues at the recorded operation index.
//! Writes a failed attempt made after its last checkpoint are discarded. Attempts run with compensation suppressed so progress
//! already checkpointed survives the failure and the next attempt resumes
//! after it. Between attempts the driver sleeps for the policy's backoff.
//!
//! When every attempt fails the driver returns
//! [`ForgeError::RecoveryExhausted`] and leaves the snapshot in place.

use std::collections::HashMap;

use forge_types::event::ForgeEvent;
use forge_types::recovery::{RecoveryPolicy, saturating_millis};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::checkpoint::{CheckpointManager, CheckpointTarget, completed_prefix};
use super::definition::Workflow;
use super::error::ForgeError;
use super::executor::{RunPlan, Smith, check_snapshot};
use super::foundry::{Foundry, WorkflowRef};
use super::identity::StableKey;
use crate::persistence::BoxSnapshotStore;

/// Foundry property holding the 1-based number of the current recovery attempt.
pub const RECOVERY_ATTEMPT_KEY: &str = "forge.recovery.attempt";

/// Drives a workflow to completion across transient failures.
pub struct RecoveryDriver<'s> {
    smith: &'s Smith,
}

impl<'s> RecoveryDriver<'s> {
    pub fn new(smith: &'s Smith) -> Self {
        Self { smith }
    }

    /// Run (or resume) `workflow` under stable keys, retrying per `policy`.
    pub async fn run_with_recovery(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        store: &BoxSnapshotStore,
        foundry_key: &str,
        workflow_key: &str,
        policy: &RecoveryPolicy,
    ) -> Result<Value, ForgeError> {
        self.run_with_recovery_cancel(
            workflow,
            foundry,
            store,
            foundry_key,
            workflow_key,
            policy,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`RecoveryDriver::run_with_recovery`]; cancellation also interrupts backoff.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_with_recovery_cancel(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        store: &BoxSnapshotStore,
        foundry_key: &str,
        workflow_key: &str,
        policy: &RecoveryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Value, ForgeError> {
        let foundry_id = StableKey::derive(foundry_key);
        let workflow_id = StableKey::derive(workflow_key);
        let target = CheckpointTarget {
            manager: CheckpointManager::new(store.clone()),
            foundry_id,
            workflow_id,
        };
        let max_attempts = policy.max_attempts.max(1);
        let baseline = foundry.properties().clone();

        foundry.pin_execution_id(foundry_id);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let attempt_run = self.attempt(workflow, foundry, &target, &baseline, attempt, max_attempts, cancel);
            let error = match attempt_run.await {
                Ok(output) => {
                    if attempt > 1 {
                        tracing::info!(
                            foundry_key,
                            workflow_key,
                            attempt,
                            "workflow recovered"
                        );
                    }
                    return Ok(output);
                }
                Err(error) => error,
            };

            let final_attempt =
                error.is_permanent() || cancel.is_cancelled() || !policy.should_retry(attempt);
            let delay = policy.delay_for(attempt);

            tracing::warn!(
                foundry_key,
                workflow_key,
                attempt,
                max_attempts,
                will_retry = !final_attempt,
                error = %error,
                "recovery attempt failed"
            );
            self.smith.publish(ForgeEvent::RecoveryAttemptFailed {
                execution_id: foundry_id,
                attempt,
                error: error.to_string(),
                will_retry: !final_attempt,
                retry_in_ms: (!final_attempt).then(|| saturating_millis(delay)),
            });

            if error.is_permanent() || cancel.is_cancelled() {
                return Err(error);
            }
            if final_attempt {
                return Err(ForgeError::RecoveryExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(error),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        target: &CheckpointTarget,
        baseline: &HashMap<String, Value>,
        attempt: u32,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<Value, ForgeError> {
        let snapshot = target.manager.load(target.foundry_id, target.workflow_id).await?;

        if let Some(snapshot) = &snapshot {
            check_snapshot(workflow, snapshot)?;
        }

        foundry.begin_run(WorkflowRef::from(workflow));
        foundry.clear_properties();
        foundry.restore_properties(baseline.clone());
        let (start_index, input, completed) = match snapshot {
            Some(snapshot) => {
                let completed = completed_prefix(&snapshot);
                foundry.restore_properties(snapshot.properties);
                (
                    snapshot.next_operation_index,
                    snapshot.last_output.unwrap_or(Value::Null),
                    completed,
                )
            }
            None => (0, Value::Null, Vec::new()),
        };
        foundry.set(RECOVERY_ATTEMPT_KEY, attempt);

        tracing::debug!(
            foundry_id = %target.foundry_id,
            attempt,
            start_index,
            "recovery attempt started"
        );
        self.smith.publish(ForgeEvent::RecoveryAttemptStarted {
            execution_id: foundry.execution_id(),
            attempt,
            max_attempts,
            resume_index: start_index,
        });

        let plan = RunPlan {
            start_index,
            input,
            completed,
            checkpoint: Some(target.clone()),
            compensate: false,
        };
        self.smith.execute(workflow, foundry, plan, cancel).await
    }
}

impl Smith {
    /// Shorthand for [`RecoveryDriver::run_with_recovery`].
    pub async fn run_with_recovery(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        store: &BoxSnapshotStore,
        foundry_key: &str,
        workflow_key: &str,
        policy: &RecoveryPolicy,
    ) -> Result<Value, ForgeError> {
        RecoveryDriver::new(self)
            .run_with_recovery(workflow, foundry, store, foundry_key, workflow_key, policy)
            .await
    }
}

/// The ids a recovery driver uses for a pair of caller keys.
pub fn recovery_ids(foundry_key: &str, workflow_key: &str) -> (Uuid, Uuid) {
    (StableKey::derive(foundry_key), StableKey::derive(workflow_key))
}
