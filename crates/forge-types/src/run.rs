//! Run lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a workflow run as driven by the Smith.
///
/// ```text
/// NotStarted -> Running -> Completed
///                       -> Failed
///                       -> Compensating -> CompensatedOk | CompensatedFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Compensating,
    /// Run failed and every completed operation was restored.
    CompensatedOk,
    /// Run failed and at least one restore failed or was skipped.
    CompensatedFailed,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::CompensatedOk
                | RunStatus::CompensatedFailed
        )
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::NotStarted
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Compensating => "compensating",
            RunStatus::CompensatedOk => "compensated_ok",
            RunStatus::CompensatedFailed => "compensated_failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_started" => Ok(RunStatus::NotStarted),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "compensating" => Ok(RunStatus::Compensating),
            "compensated_ok" => Ok(RunStatus::CompensatedOk),
            "compensated_failed" => Ok(RunStatus::CompensatedFailed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}
