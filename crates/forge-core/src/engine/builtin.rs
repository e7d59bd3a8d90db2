//! Built-in middleware: timing, timeouts, retries and run-level tracing spans.

use std::time::{Duration, Instant};

use forge_types::recovery::{RecoveryPolicy, saturating_millis};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::definition::Workflow;
use super::error::{ForgeError, OperationError};
use super::foundry::Foundry;
use super::middleware::{Next, OperationMiddleware, WorkflowMiddleware, WorkflowNext};
use super::operation::BoxOperation;

/// Property key under which [`TimingMiddleware`] stores an operation's elapsed time.
pub fn elapsed_key(operation: &str) -> String {
    format!("{operation}.elapsed_ms")
}

/// Records how long each operation took, in milliseconds, as a Foundry property.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimingMiddleware;

impl OperationMiddleware for TimingMiddleware {
    async fn handle(
        &self,
        operation: &BoxOperation,
        foundry: &mut Foundry,
        input: Value,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        let started = Instant::now();
        let result = next.run(foundry, input, cancel).await;
        let elapsed_ms = saturating_millis(started.elapsed());

        foundry.set(elapsed_key(operation.name()), elapsed_ms);
        tracing::debug!(
            operation = %operation.name(),
            elapsed_ms,
            ok = result.is_ok(),
            "operation timed"
        );
        result
    }
}

/// Fails an operation with [`OperationError::TimedOut`] when it exceeds a deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl OperationMiddleware for TimeoutMiddleware {
    async fn handle(
        &self,
        operation: &BoxOperation,
        foundry: &mut Foundry,
        input: Value,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        match tokio::time::timeout(self.timeout, next.run(foundry, input, cancel)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation = %operation.name(),
                    timeout_ms = saturating_millis(self.timeout),
                    "operation timed out"
                );
                Err(OperationError::TimedOut(self.timeout))
            }
        }
    }
}

/// Re-runs a failed operation under a [`RecoveryPolicy`].
///
/// Each attempt goes through the middleware registered after this one, so
/// register it outside a [`TimeoutMiddleware`] to get a deadline per attempt.
/// Cancellation and middleware rejections are returned as is, and
/// cancellation also cuts the backoff short.
#[derive(Debug, Clone, Default)]
pub struct RetryMiddleware {
    policy: RecoveryPolicy,
}

impl RetryMiddleware {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }
}

impl OperationMiddleware for RetryMiddleware {
    async fn handle(
        &self,
        operation: &BoxOperation,
        foundry: &mut Foundry,
        input: Value,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<Value, OperationError> {
        let mut attempt: u32 = 1;
        loop {
            let error = match next.replay().run(foundry, input.clone(), cancel).await {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };
            if !error.is_retryable() || !self.policy.should_retry(attempt) {
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                operation = %operation.name(),
                attempt,
                retry_in_ms = saturating_millis(delay),
                error = %error,
                "operation failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(OperationError::Cancelled),
            }
            attempt += 1;
        }
    }
}

/// Wraps each run in a `workflow` tracing span and logs its outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkflowMiddleware;

impl WorkflowMiddleware for TracingWorkflowMiddleware {
    async fn handle(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        next: WorkflowNext<'_>,
        cancel: &CancellationToken,
    ) -> Result<Value, ForgeError> {
        let span = tracing::info_span!(
            "workflow",
            workflow = %workflow.name(),
            workflow_id = %workflow.id(),
            execution_id = %foundry.execution_id(),
            start_index = next.start_index(),
        );
        let started = Instant::now();

        let result = next.run(foundry, cancel).instrument(span.clone()).await;

        let elapsed_ms = saturating_millis(started.elapsed());
        span.in_scope(|| match &result {
            Ok(_) => tracing::info!(elapsed_ms, "workflow completed"),
            Err(e) => tracing::warn!(elapsed_ms, error = %e, "workflow failed"),
        });
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
