//! Operation-level and workflow-level middleware chains.
//!
//! A middleware receives a `next` continuation. Calling `next.run(..)`
//! invokes the rest of the chain and finally the wrapped target; not calling
//! it short-circuits. `Next` is consumed by `run`, so a middleware cannot
//! invoke the continuation twice.
//!
//! Middleware registered first is outermost:
//!
//! ```text
//! M1.before -> M2.before -> target -> M2.after -> M1.after
//! ```

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::BoxFuture;
use super::definition::Workflow;
use super::error::{ForgeError, OperationError};
use super::executor::RunAll;
use super::foundry::Foundry;
use super::operation::BoxOperation;

// ---------------------------------------------------------------------------
// Operation middleware
// ---------------------------------------------------------------------------

/// Wraps every single operation invocation.
pub trait OperationMiddleware: Send + Sync {
    fn handle(
        &self,
        operation: &BoxOperation,
        foundry: &mut Foundry,
        input: Value,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Value, OperationError>> + Send;
}

/// Object-safe version of [`OperationMiddleware`].
pub trait OperationMiddlewareDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        operation: &'a BoxOperation,
        foundry: &'a mut Foundry,
        input: Value,
        next: Next<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, OperationError>>;
}

impl<T: OperationMiddleware> OperationMiddlewareDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        operation: &'a BoxOperation,
        foundry: &'a mut Foundry,
        input: Value,
        next: Next<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, OperationError>> {
        Box::pin(self.handle(operation, foundry, input, next, cancel))
    }
}

/// Continuation into the rest of an operation middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn OperationMiddlewareDyn>],
    operation: &'a BoxOperation,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn OperationMiddlewareDyn>],
        operation: &'a BoxOperation,
    ) -> Self {
        Self { chain, operation }
    }

    /// Operation at the end of the chain.
    pub fn operation(&self) -> &BoxOperation {
        self.operation
    }

    /// A fresh continuation over the same remaining chain, for built-in
    /// middleware that re-enters it.
    pub(crate) fn replay(&self) -> Next<'a> {
        Next::new(self.chain, self.operation)
    }

    /// Invoke the remaining middleware and then the operation itself.
    pub fn run<'f>(
        self,
        foundry: &'f mut Foundry,
        input: Value,
        cancel: &'f CancellationToken,
    ) -> BoxFuture<'f, Result<Value, OperationError>>
    where
        'a: 'f,
    {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle_boxed(
                self.operation,
                foundry,
                input,
                Next::new(rest, self.operation),
                cancel,
            ),
            None => self.operation.forge_boxed(input, foundry, cancel),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow middleware
// ---------------------------------------------------------------------------

/// Wraps an entire workflow run.
pub trait WorkflowMiddleware: Send + Sync {
    fn handle(
        &self,
        workflow: &Workflow,
        foundry: &mut Foundry,
        next: WorkflowNext<'_>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Value, ForgeError>> + Send;
}

/// Object-safe version of [`WorkflowMiddleware`].
pub trait WorkflowMiddlewareDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        workflow: &'a Workflow,
        foundry: &'a mut Foundry,
        next: WorkflowNext<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, ForgeError>>;
}

impl<T: WorkflowMiddleware> WorkflowMiddlewareDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        workflow: &'a Workflow,
        foundry: &'a mut Foundry,
        next: WorkflowNext<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value, ForgeError>> {
        Box::pin(self.handle(workflow, foundry, next, cancel))
    }
}

/// Continuation into the rest of a workflow middleware chain.
///
/// The terminal step executes the workflow's operations.
pub struct WorkflowNext<'a> {
    chain: &'a [Arc<dyn WorkflowMiddlewareDyn>],
    terminal: RunAll<'a>,
}

impl<'a> WorkflowNext<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn WorkflowMiddlewareDyn>], terminal: RunAll<'a>) -> Self {
        Self { chain, terminal }
    }

    /// Index the run will start from (non-zero when resuming a checkpoint).
    pub fn start_index(&self) -> usize {
        self.terminal.start_index()
    }

    /// Invoke the remaining middleware and then the operations.
    pub fn run<'f>(
        self,
        foundry: &'f mut Foundry,
        cancel: &'f CancellationToken,
    ) -> BoxFuture<'f, Result<Value, ForgeError>>
    where
        'a: 'f,
    {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let workflow = self.terminal.workflow();
                head.handle_boxed(workflow, foundry, WorkflowNext::new(rest, self.terminal), cancel)
            }
            None => self.terminal.run(foundry, cancel),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
