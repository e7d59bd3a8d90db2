//! Workflow execution core for Forge.
//!
//! Operations run in order against a shared Foundry, wrapped by
//! operation- and workflow-level middleware. Failures trigger reverse
//! compensation; progress can be checkpointed through the
//! [`persistence::SnapshotStore`] port and resumed with retry.
//!
//! This crate depends only on `forge-types` -- never on `forge-infra` or any
//! database/IO crate. Store implementations live in forge-infra.

pub mod engine;
pub mod event;
pub mod persistence;

pub use engine::{
    BoxOperation, Foundry, ForgeError, Operation, OperationError, Smith, Workflow,
};
