//! Workflow definition and builder.
//!
//! A [`Workflow`] is an immutable, ordered list of operations plus an id and
//! a name. Cloning is cheap (the operation list is shared), so one definition
//! can be executed any number of times, concurrently, with distinct Foundries.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use super::error::ForgeError;
use super::operation::{BoxOperation, Operation};

/// An immutable, ordered sequence of operations.
#[derive(Clone, Debug)]
pub struct Workflow {
    id: Uuid,
    name: String,
    description: Option<String>,
    operations: Arc<[BoxOperation]>,
}

impl Workflow {
    /// Start building a workflow.
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn operations(&self) -> &[BoxOperation] {
        &self.operations
    }

    pub fn operation(&self, index: usize) -> Option<&BoxOperation> {
        self.operations.get(index)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Fluent builder for [`Workflow`].
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    id: Option<Uuid>,
    name: String,
    description: Option<String>,
    operations: Vec<BoxOperation>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Use a fixed id instead of a generated one.
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append an operation.
    pub fn then<O: Operation + 'static>(mut self, operation: O) -> Self {
        self.operations.push(BoxOperation::new(operation));
        self
    }

    /// Append an operation that may also belong to other workflows.
    pub fn then_boxed(mut self, operation: BoxOperation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Validate and freeze the workflow.
    pub fn build(self) -> Result<Workflow, ForgeError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ForgeError::InvalidWorkflow(
                "workflow name must not be empty".to_string(),
            ));
        }
        if self.operations.is_empty() {
            return Err(ForgeError::InvalidWorkflow(format!(
                "workflow '{name}' has no operations"
            )));
        }
        if let Some(position) = self
            .operations
            .iter()
            .position(|op| op.name().trim().is_empty())
        {
            return Err(ForgeError::InvalidWorkflow(format!(
                "operation #{position} of workflow '{name}' has an empty name"
            )));
        }

        let mut seen = HashSet::with_capacity(self.operations.len());
        for (position, op) in self.operations.iter().enumerate() {
            if !seen.insert(op.id()) {
                return Err(ForgeError::InvalidWorkflow(format!(
                    "operation #{position} ('{}') of workflow '{name}' duplicates id {}",
                    op.name(),
                    op.id()
                )));
            }
        }

        Ok(Workflow {
            id: self.id.unwrap_or_else(Uuid::now_v7),
            name: name.to_string(),
            description: self.description,
            operations: self.operations.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
