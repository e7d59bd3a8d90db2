//! Workflow execution engine.
//!
//! - [`foundry`]: shared execution context (properties, services, middleware)
//! - [`operation`]: the unit of work and its compensating action
//! - [`definition`]: immutable workflows and their builder
//! - [`middleware`]: operation- and workflow-level chains, plus [`builtin`] ones
//! - [`executor`]: the Smith, which runs workflows
//! - [`compensation`]: reverse rollback of completed operations
//! - [`checkpoint`] and [`recovery`]: snapshots and resume-with-retry

use std::future::Future;
use std::pin::Pin;

pub mod builtin;
pub mod checkpoint;
pub mod compensation;
pub mod definition;
pub mod error;
pub mod executor;
pub mod foundry;
pub mod identity;
pub mod middleware;
pub mod operation;
pub mod recovery;

/// Boxed, sendable future used at the object-safe trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use builtin::{RetryMiddleware, TimeoutMiddleware, TimingMiddleware, TracingWorkflowMiddleware};
pub use checkpoint::CheckpointManager;
pub use compensation::{CompensationPolicy, CompensationReport, Compensator, CompletedOperation};
pub use definition::{Workflow, WorkflowBuilder};
pub use error::{CompensationError, FailureDisposition, ForgeError, OperationError};
pub use executor::Smith;
pub use foundry::{Foundry, WorkflowRef};
pub use identity::StableKey;
pub use middleware::{
    Next, OperationMiddleware, OperationMiddlewareDyn, WorkflowMiddleware, WorkflowMiddlewareDyn,
    WorkflowNext,
};
pub use operation::{BoxOperation, FnOperation, Operation, OperationDyn};
pub use recovery::{RECOVERY_ATTEMPT_KEY, RecoveryDriver};
