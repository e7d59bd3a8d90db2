//! Error taxonomy for workflow execution.
//!
//! Two layers:
//! - [`OperationError`] is what an operation body or an operation-level
//!   middleware returns.
//! - [`ForgeError`] is what a run returns to the caller. It wraps the failing
//!   operation's error together with compensation and recovery outcomes.

use std::time::Duration;

use forge_types::error::PersistenceError;

// ---------------------------------------------------------------------------
// OperationError
// ---------------------------------------------------------------------------

/// Errors raised by an operation's forward or compensating action.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The operation failed with a message.
    #[error("{0}")]
    Failed(String),

    /// The cancellation signal was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not finish before its deadline.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// A middleware short-circuited the call.
    #[error("rejected by middleware: {0}")]
    Rejected(String),

    /// Any other error raised by operation code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OperationError {
    /// Shorthand for [`OperationError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        OperationError::Failed(message.into())
    }

    /// Whether this error came from observing the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Cancelled)
    }

    /// Whether running the operation again could succeed. Cancellation and
    /// middleware rejections are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OperationError::Cancelled | OperationError::Rejected(_))
    }
}

// ---------------------------------------------------------------------------
// CompensationError
// ---------------------------------------------------------------------------

/// A compensating action that failed during rollback.
#[derive(Debug, thiserror::Error)]
#[error("restore of '{operation}' (#{index}) failed: {source}")]
pub struct CompensationError {
    /// Name of the operation whose restore failed.
    pub operation: String,
    /// Position of the operation in its workflow.
    pub index: usize,
    /// Error returned by the restore action.
    pub source: OperationError,
}

// ---------------------------------------------------------------------------
// ForgeError
// ---------------------------------------------------------------------------

/// Errors surfaced by `Smith` runs and the recovery driver.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// An operation's forward action (or its middleware chain) failed.
    #[error("operation '{operation}' (#{index}) failed: {source}")]
    OperationFailed {
        operation: String,
        index: usize,
        source: OperationError,
        /// Whether completed operations were handed to compensation.
        compensated: bool,
    },

    /// An operation failed and one or more compensating actions also failed.
    #[error(
        "operation '{operation}' (#{index}) failed: {source}; {} compensation error(s): {}",
        .errors.len(),
        join_errors(.errors)
    )]
    CompensationFailed {
        operation: String,
        index: usize,
        source: OperationError,
        errors: Vec<CompensationError>,
    },

    /// Every recovery attempt failed. The snapshot is left in place.
    #[error("recovery exhausted after {attempts} attempt(s): {last}")]
    RecoveryExhausted { attempts: u32, last: Box<ForgeError> },

    /// Snapshot I/O failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The workflow could not be built.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// A stored snapshot does not fit the workflow it would resume.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// A workflow-level middleware aborted the run.
    #[error("workflow middleware error: {0}")]
    Middleware(String),
}

/// How a failed run left the world, for callers deciding what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The run failed and its completed operations were compensated.
    Compensated,
    /// The run failed without compensation; its checkpoint can be resumed.
    Resumable,
    /// Recovery gave up; manual intervention is required.
    Exhausted,
    /// Configuration or storage problem unrelated to a specific operation.
    Fatal,
}

impl ForgeError {
    /// Classify the failure.
    pub fn disposition(&self) -> FailureDisposition {
        match self {
            ForgeError::OperationFailed { compensated: true, .. }
            | ForgeError::CompensationFailed { .. } => FailureDisposition::Compensated,
            ForgeError::OperationFailed { compensated: false, .. } => {
                FailureDisposition::Resumable
            }
            ForgeError::RecoveryExhausted { .. } => FailureDisposition::Exhausted,
            ForgeError::Persistence(_)
            | ForgeError::InvalidWorkflow(_)
            | ForgeError::InvalidSnapshot(_)
            | ForgeError::Middleware(_) => FailureDisposition::Fatal,
        }
    }

    /// The operation error that started the failure, if any.
    pub fn root_operation_error(&self) -> Option<&OperationError> {
        match self {
            ForgeError::OperationFailed { source, .. }
            | ForgeError::CompensationFailed { source, .. } => Some(source),
            ForgeError::RecoveryExhausted { last, .. } => last.root_operation_error(),
            _ => None,
        }
    }

    /// Compensation errors carried by this failure (empty unless surfaced by policy).
    pub fn compensation_errors(&self) -> &[CompensationError] {
        match self {
            ForgeError::CompensationFailed { errors, .. } => errors,
            ForgeError::RecoveryExhausted { last, .. } => last.compensation_errors(),
            _ => &[],
        }
    }

    /// Whether a recovery attempt should not be retried after this error.
    pub(crate) fn is_permanent(&self) -> bool {
        matches!(
            self,
            ForgeError::InvalidWorkflow(_) | ForgeError::InvalidSnapshot(_)
        )
    }
}

fn join_errors(errors: &[CompensationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
