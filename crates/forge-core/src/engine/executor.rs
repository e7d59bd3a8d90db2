//! The Smith: executes workflows against a Foundry.
//!
//! A run walks the workflow's operations in order, feeding each operation's
//! output to the next through the Foundry's operation middleware chain. The
//! whole walk is wrapped by the Smith's workflow middleware chain.
//!
//! After each success the Smith checkpoints progress (when a snapshot store
//! is attached). When an operation fails, every completed operation is
//! compensated in reverse order, including those a resumed snapshot records
//! as done in an earlier process. Recovery attempts and runs cancelled with
//! `compensate_on_cancel` disabled skip compensation.
//!
//! Status transitions recorded on the Foundry:
//!
//! ```text
//! Running -> Completed
//!         -> Failed                      (no compensation)
//!         -> Compensating -> CompensatedOk | CompensatedFailed
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use forge_types::config::EngineConfig;
use forge_types::event::ForgeEvent;
use forge_types::recovery::saturating_millis;
use forge_types::run::RunStatus;
use forge_types::snapshot::Snapshot;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::BoxFuture;
use super::builtin::TimeoutMiddleware;
use super::checkpoint::{CheckpointManager, CheckpointTarget, completed_prefix};
use super::compensation::{CompensationPolicy, CompensationReport, Compensator, CompletedOperation};
use super::definition::Workflow;
use super::error::{ForgeError, OperationError};
use super::foundry::{Foundry, WorkflowRef};
use super::middleware::{
    Next, OperationMiddlewareDyn, WorkflowMiddleware, WorkflowMiddlewareDyn, WorkflowNext,
};
use crate::event::EventBus;
use crate::persistence::BoxSnapshotStore;

// ---------------------------------------------------------------------------
// Run plan
// ---------------------------------------------------------------------------

/// Where a run starts, what it is fed and how failures are handled.
///
/// `completed` holds the operations before `start_index`, already done.
pub(crate) struct RunPlan {
    pub start_index: usize,
    pub input: Value,
    pub completed: Vec<CompletedOperation>,
    pub checkpoint: Option<CheckpointTarget>,
    pub compensate: bool,
}

/// Terminal step of the workflow middleware chain: execute the operations.
pub(crate) struct RunAll<'a> {
    smith: &'a Smith,
    workflow: &'a Workflow,
    plan: RunPlan,
}

impl<'a> RunAll<'a> {
    pub(crate) fn workflow(&self) -> &'a Workflow {
        self.workflow
    }

    pub(crate) fn start_index(&self) -> usize {
        self.plan.start_index
    }

    pub(crate) fn run<'f>(
        self,
        foundry: &'f mut Foundry,
        cancel: &'f CancellationToken,
    ) -> BoxFuture<'f, Result<Value, ForgeError>>
    where
        'a: 'f,
    {
        Box::pin(async move {
            self.smith
                .run_operations(self.workflow, foundry, self.plan, cancel)
                .await
        })
    }
}

// ---------------------------------------------------------------------------
// Smith
// ---------------------------------------------------------------------------

/// Workflow executor.
///
/// A Smith is stateless between runs and can drive any number of workflows
/// concurrently, each with its own Foundry.
pub struct Smith {
    config: EngineConfig,
    workflow_middleware: Vec<Arc<dyn WorkflowMiddlewareDyn>>,
    store: Option<BoxSnapshotStore>,
    events: Option<EventBus>,
}

impl Smith {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            workflow_middleware: Vec::new(),
            store: None,
            events: None,
        }
    }

    /// Checkpoint every run into `store`, keyed by (Foundry execution id, workflow id).
    pub fn with_store(mut self, store: BoxSnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_workflow_middleware<M: WorkflowMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.use_workflow_middleware(middleware);
        self
    }

    /// Append a workflow middleware. The first one added is outermost.
    pub fn use_workflow_middleware<M: WorkflowMiddleware + 'static>(&mut self, middleware: M) {
        self.workflow_middleware.push(Arc::new(middleware));
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&BoxSnapshotStore> {
        self.store.as_ref()
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.events.as_ref()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run `workflow` from its first operation with `input`.
    pub async fn run(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        input: Value,
    ) -> Result<Value, ForgeError> {
        self.run_with_cancel(workflow, foundry, input, &CancellationToken::new())
            .await
    }

    /// Run `workflow`, observing `cancel` before every operation.
    pub async fn run_with_cancel(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ForgeError> {
        foundry.begin_run(WorkflowRef::from(workflow));
        let checkpoint = self.store.as_ref().map(|store| CheckpointTarget {
            manager: CheckpointManager::new(store.clone()),
            foundry_id: foundry.execution_id(),
            workflow_id: workflow.id(),
        });
        let plan = RunPlan {
            start_index: 0,
            input,
            completed: Vec::new(),
            checkpoint,
            compensate: true,
        };
        self.execute(workflow, foundry, plan, cancel).await
    }

    /// Continue a run from `snapshot` using the Smith's own store.
    ///
    /// The snapshot's properties are merged into the Foundry (snapshot values
    /// win) and execution resumes at `next_operation_index` with the
    /// checkpointed output as input. If the resumed run fails, operations the
    /// snapshot records as completed are compensated too.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        snapshot: Snapshot,
        cancel: &CancellationToken,
    ) -> Result<Value, ForgeError> {
        check_snapshot(workflow, &snapshot)?;

        foundry.pin_execution_id(snapshot.foundry_execution_id);
        foundry.begin_run(WorkflowRef::from(workflow));
        let completed = completed_prefix(&snapshot);
        foundry.restore_properties(snapshot.properties);

        let checkpoint = self.store.as_ref().map(|store| CheckpointTarget {
            manager: CheckpointManager::new(store.clone()),
            foundry_id: snapshot.foundry_execution_id,
            workflow_id: snapshot.workflow_id,
        });
        let plan = RunPlan {
            start_index: snapshot.next_operation_index,
            input: snapshot.last_output.unwrap_or(Value::Null),
            completed,
            checkpoint,
            compensate: true,
        };
        self.execute(workflow, foundry, plan, cancel).await
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    pub(crate) async fn execute(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        plan: RunPlan,
        cancel: &CancellationToken,
    ) -> Result<Value, ForgeError> {
        let execution_id = foundry.execution_id();
        let started = Instant::now();

        tracing::info!(
            execution_id = %execution_id,
            workflow = %workflow.name(),
            operations = workflow.len(),
            start_index = plan.start_index,
            "run started"
        );
        self.publish(ForgeEvent::RunStarted {
            execution_id,
            workflow_name: workflow.name().to_string(),
            operation_count: workflow.len(),
            start_index: plan.start_index,
        });

        let terminal = RunAll {
            smith: self,
            workflow,
            plan,
        };
        let result = WorkflowNext::new(&self.workflow_middleware, terminal)
            .run(foundry, cancel)
            .await;

        match &result {
            Ok(_) => {
                if foundry.status() == RunStatus::Running {
                    foundry.set_status(RunStatus::Completed);
                }
                let duration_ms = saturating_millis(started.elapsed());
                tracing::info!(execution_id = %execution_id, duration_ms, "run completed");
                self.publish(ForgeEvent::RunCompleted {
                    execution_id,
                    workflow_name: workflow.name().to_string(),
                    duration_ms,
                });
            }
            Err(e) => {
                if foundry.status() == RunStatus::Running {
                    foundry.set_status(RunStatus::Failed);
                }
                tracing::warn!(
                    execution_id = %execution_id,
                    status = %foundry.status(),
                    error = %e,
                    "run failed"
                );
                self.publish(ForgeEvent::RunFailed {
                    execution_id,
                    workflow_name: workflow.name().to_string(),
                    error: e.to_string(),
                });
            }
        }

        foundry.end_run();
        result
    }

    async fn run_operations(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        plan: RunPlan,
        cancel: &CancellationToken,
    ) -> Result<Value, ForgeError> {
        let RunPlan {
            start_index,
            mut input,
            mut completed,
            checkpoint,
            compensate,
        } = plan;
        let execution_id = foundry.execution_id();
        let chain = self.operation_chain(foundry);

        for (index, operation) in workflow.operations().iter().enumerate().skip(start_index) {
            tracing::debug!(index, operation = %operation.name(), "operation started");
            self.publish(ForgeEvent::OperationStarted {
                execution_id,
                index,
                operation: operation.name().to_string(),
            });

            let started = Instant::now();
            let result = if cancel.is_cancelled() {
                Err(OperationError::Cancelled)
            } else {
                Next::new(&chain, operation)
                    .run(foundry, std::mem::take(&mut input), cancel)
                    .await
            };

            let output = match result {
                Ok(output) => output,
                Err(source) => {
                    tracing::warn!(index, operation = %operation.name(), error = %source, "operation failed");
                    self.publish(ForgeEvent::OperationFailed {
                        execution_id,
                        index,
                        operation: operation.name().to_string(),
                        error: source.to_string(),
                    });
                    return Err(self
                        .fail(workflow, foundry, &completed, index, source, compensate, checkpoint.as_ref())
                        .await);
                }
            };

            let duration_ms = saturating_millis(started.elapsed());
            tracing::debug!(index, operation = %operation.name(), duration_ms, "operation completed");
            self.publish(ForgeEvent::OperationCompleted {
                execution_id,
                index,
                operation: operation.name().to_string(),
                duration_ms,
            });
            completed.push(CompletedOperation {
                index,
                output: output.clone(),
            });

            if let Some(target) = &checkpoint {
                if let Err(e) = target.save(workflow, foundry, &completed).await {
                    tracing::error!(index, error = %e, "failed to checkpoint progress");
                    if compensate {
                        self.compensate(workflow, foundry, &completed, index).await;
                        discard_checkpoint(target).await;
                    } else {
                        foundry.set_status(RunStatus::Failed);
                    }
                    return Err(ForgeError::Persistence(e));
                }
                self.publish(ForgeEvent::CheckpointSaved {
                    execution_id,
                    workflow_id: target.workflow_id,
                    next_operation_index: index + 1,
                });
            }

            input = output;
        }

        if let Some(target) = &checkpoint {
            target.clear().await?;
        }
        foundry.set_status(RunStatus::Completed);
        Ok(input)
    }

    /// Foundry middleware plus the configured per-operation timeout (innermost).
    fn operation_chain(&self, foundry: &Foundry) -> Vec<Arc<dyn OperationMiddlewareDyn>> {
        let mut chain = foundry.operation_middleware().to_vec();
        if let Some(ms) = self.config.operation_timeout_ms {
            chain.push(Arc::new(TimeoutMiddleware::new(Duration::from_millis(ms))));
        }
        chain
    }

    /// Turn an operation failure into the run's error, compensating first when allowed.
    ///
    /// A compensated run discards its checkpoint: the progress it records has
    /// been rolled back. Without compensation the checkpoint stays resumable.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        completed: &[CompletedOperation],
        index: usize,
        source: OperationError,
        compensate: bool,
        checkpoint: Option<&CheckpointTarget>,
    ) -> ForgeError {
        let operation = workflow
            .operation(index)
            .map(|op| op.name().to_string())
            .unwrap_or_default();
        let compensate = compensate && (!source.is_cancelled() || self.config.compensate_on_cancel);

        if !compensate {
            foundry.set_status(RunStatus::Failed);
            return ForgeError::OperationFailed {
                operation,
                index,
                source,
                compensated: false,
            };
        }

        let report = self.compensate(workflow, foundry, completed, index).await;
        if let Some(target) = checkpoint {
            discard_checkpoint(target).await;
        }
        if !report.failures.is_empty() && self.config.throw_on_compensation_error {
            ForgeError::CompensationFailed {
                operation,
                index,
                source,
                errors: report.failures,
            }
        } else {
            ForgeError::OperationFailed {
                operation,
                index,
                source,
                compensated: true,
            }
        }
    }

    async fn compensate(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        completed: &[CompletedOperation],
        failed_index: usize,
    ) -> CompensationReport {
        foundry.set_status(RunStatus::Compensating);
        let report = Compensator::new(CompensationPolicy::from(&self.config), self.events.as_ref())
            .compensate(workflow.operations(), completed, foundry, failed_index)
            .await;
        foundry.set_status(if report.is_clean() {
            RunStatus::CompensatedOk
        } else {
            RunStatus::CompensatedFailed
        });
        report
    }

    pub(crate) fn publish(&self, event: ForgeEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

impl Default for Smith {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Smith {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Smith")
            .field("config", &self.config)
            .field("workflow_middleware", &self.workflow_middleware.len())
            .field("store", &self.store.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// Best-effort removal after rollback; the run's own error takes precedence.
async fn discard_checkpoint(target: &CheckpointTarget) {
    if let Err(e) = target.clear().await {
        tracing::warn!(
            foundry_id = %target.foundry_id,
            workflow_id = %target.workflow_id,
            error = %e,
            "failed to discard checkpoint after compensation"
        );
    }
}

/// Reject snapshots that do not belong to `workflow` or point past its end.
pub(crate) fn check_snapshot(workflow: &Workflow, snapshot: &Snapshot) -> Result<(), ForgeError> {
    if snapshot.workflow_name != workflow.name() {
        return Err(ForgeError::InvalidSnapshot(format!(
            "snapshot belongs to workflow '{}', not '{}'",
            snapshot.workflow_name,
            workflow.name()
        )));
    }
    snapshot
        .validate(workflow.len())
        .map_err(ForgeError::InvalidSnapshot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::middleware::WorkflowNext;
    use crate::engine::operation::FnOperation;
    use serde_json::json;

    fn add(name: &str, n: i64) -> FnOperation {
        FnOperation::new(name, move |input, _| {
            Ok(json!(input.as_i64().unwrap_or_default() + n))
        })
    }

    fn failing(name: &str) -> FnOperation {
        FnOperation::new(name, |_, _| Err(OperationError::failed("boom")))
    }

    #[tokio::test]
    async fn outputs_chain_through_operations() {
        let workflow = Workflow::builder("sum")
            .then(add("one", 1))
            .then(add("ten", 10))
            .then(add("hundred", 100))
            .build()
            .unwrap();
        let mut foundry = Foundry::new();

        let out = Smith::default()
            .run(&workflow, &mut foundry, json!(0))
            .await
            .unwrap();

        assert_eq!(out, json!(111));
        assert_eq!(foundry.status(), RunStatus::Completed);
        assert!(foundry.current_workflow().is_none());
    }

    #[tokio::test]
    async fn failure_sets_compensated_status() {
        let workflow = Workflow::builder("wf")
            .then(add("a", 1))
            .then(failing("b"))
            .build()
            .unwrap();
        let mut foundry = Foundry::new();

        let err = Smith::default()
            .run(&workflow, &mut foundry, json!(0))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ForgeError::OperationFailed { index: 1, compensated: true, .. }
        ));
        assert_eq!(foundry.status(), RunStatus::CompensatedOk);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let workflow = Workflow::builder("wf")
            .then(FnOperation::new("never", |_, foundry| {
                foundry.set("ran", true);
                Ok(Value::Null)
            }))
            .build()
            .unwrap();
        let mut foundry = Foundry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Smith::default()
            .run_with_cancel(&workflow, &mut foundry, Value::Null, &cancel)
            .await
            .unwrap_err();

        assert!(err.root_operation_error().unwrap().is_cancelled());
        assert!(!foundry.contains("ran"));
    }

    #[tokio::test]
    async fn cancellation_without_compensation_when_disabled() {
        let workflow = Workflow::builder("wf")
            .then(add("a", 1))
            .build()
            .unwrap();
        let config = EngineConfig {
            compensate_on_cancel: false,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut foundry = Foundry::new();

        let err = Smith::new(config)
            .run_with_cancel(&workflow, &mut foundry, Value::Null, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ForgeError::OperationFailed { compensated: false, .. }));
        assert_eq!(foundry.status(), RunStatus::Failed);
    }

    struct Gate;

    impl WorkflowMiddleware for Gate {
        async fn handle(
            &self,
            workflow: &Workflow,
            foundry: &mut Foundry,
            next: WorkflowNext<'_>,
            cancel: &CancellationToken,
        ) -> Result<Value, ForgeError> {
            if foundry.get_as::<bool>("maintenance").unwrap_or(false) {
                return Err(ForgeError::Middleware(format!(
                    "{} blocked during maintenance",
                    workflow.name()
                )));
            }
            next.run(foundry, cancel).await
        }
    }

    #[tokio::test]
    async fn workflow_middleware_can_block_runs() {
        let workflow = Workflow::builder("wf")
            .then(FnOperation::new("mark", |_, foundry| {
                foundry.set("ran", true);
                Ok(Value::Null)
            }))
            .build()
            .unwrap();
        let smith = Smith::default().with_workflow_middleware(Gate);

        let mut foundry = Foundry::new();
        foundry.set("maintenance", true);
        let err = smith.run(&workflow, &mut foundry, Value::Null).await.unwrap_err();
        assert!(matches!(err, ForgeError::Middleware(_)));
        assert!(!foundry.contains("ran"));
        assert_eq!(foundry.status(), RunStatus::Failed);

        foundry.set("maintenance", false);
        smith.run(&workflow, &mut foundry, Value::Null).await.unwrap();
        assert!(foundry.contains("ran"));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_timeout_applies_to_every_operation() {
        struct Hang;

        impl crate::engine::operation::Operation for Hang {
            fn name(&self) -> &str {
                "hang"
            }

            async fn forge(
                &self,
                _input: Value,
                _foundry: &mut Foundry,
                _cancel: &CancellationToken,
            ) -> Result<Value, OperationError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            }
        }

        let workflow = Workflow::builder("wf").then(Hang).build().unwrap();
        let config = EngineConfig {
            operation_timeout_ms: Some(100),
            ..Default::default()
        };

        let err = Smith::new(config)
            .run(&workflow, &mut Foundry::new(), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(
            err.root_operation_error(),
            Some(OperationError::TimedOut(_))
        ));
    }

    #[test]
    fn check_snapshot_rejects_foreign_workflow() {
        let workflow = Workflow::builder("wf").then(add("a", 1)).build().unwrap();
        let snapshot = Snapshot {
            foundry_execution_id: uuid::Uuid::nil(),
            workflow_id: workflow.id(),
            workflow_name: "other".to_string(),
            next_operation_index: 0,
            properties: Default::default(),
            last_output: None,
            completed_outputs: Vec::new(),
            saved_at: chrono::Utc::now(),
        };
        assert!(matches!(
            check_snapshot(&workflow, &snapshot),
            Err(ForgeError::InvalidSnapshot(_))
        ));
    }
}
