// SPDX-License-Identifier: MIT

//! Status enums and transition tables for protocols, steps, and job runs.
//!
//! Transition functions return outcomes; they never panic and never
//! mutate anything. Callers (the store) apply the returned status under
//! their own guard.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Rejected state-machine operation. The store is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {entity} in '{from}' does not allow '{op}'")]
pub struct InvalidTransition {
    pub entity: &'static str,
    pub from: String,
    pub op: String,
}

impl InvalidTransition {
    pub fn new(entity: &'static str, from: impl fmt::Display, op: impl fmt::Display) -> Self {
        Self {
            entity,
            from: from.to_string(),
            op: op.to_string(),
        }
    }
}

/// Lifecycle operations on a protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolOp {
    Start,
    Pause,
    Resume,
    Cancel,
}

impl fmt::Display for ProtocolOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolOp::Start => write!(f, "start"),
            ProtocolOp::Pause => write!(f, "pause"),
            ProtocolOp::Resume => write!(f, "resume"),
            ProtocolOp::Cancel => write!(f, "cancel"),
        }
    }
}

/// Status of a protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStatus {
    Pending,
    Planning,
    Planned,
    Running,
    Paused,
    Blocked,
    NeedsQa,
    Completed,
    Failed,
    Cancelled,
}

impl ProtocolStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProtocolStatus::Completed | ProtocolStatus::Failed | ProtocolStatus::Cancelled
        )
    }

    /// Apply a lifecycle operation.
    ///
    /// Returns the resulting status. Cancelling an already-settled run
    /// (`completed`/`cancelled`) is a no-op and returns the current status
    /// unchanged; every other illegal pair is an [`InvalidTransition`].
    pub fn apply(&self, op: ProtocolOp) -> Result<ProtocolStatus, InvalidTransition> {
        use ProtocolOp::*;
        use ProtocolStatus::*;

        let next = match (self, op) {
            (Pending, Start) => Planning,
            (Planned, Start) => Running,
            (Running, Pause) => Paused,
            (Paused, Resume) => Running,
            (Blocked, Resume) => Running,
            (Completed, Cancel) => Completed,
            (Cancelled, Cancel) => Cancelled,
            (_, Cancel) => Cancelled,
            (from, op) => return Err(InvalidTransition::new("protocol_run", from, op)),
        };
        Ok(next)
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolStatus::Pending => "pending",
            ProtocolStatus::Planning => "planning",
            ProtocolStatus::Planned => "planned",
            ProtocolStatus::Running => "running",
            ProtocolStatus::Paused => "paused",
            ProtocolStatus::Blocked => "blocked",
            ProtocolStatus::NeedsQa => "needs_qa",
            ProtocolStatus::Completed => "completed",
            ProtocolStatus::Failed => "failed",
            ProtocolStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Status of a step run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    NeedsQa,
    Completed,
    Failed,
    Timeout,
    Cancelled,
    Skipped,
    Blocked,
}

impl StepStatus {
    /// Terminal statuses never leave via the normal operations; only
    /// `RetryStep` re-enters from `failed`/`timeout`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed
                | StepStatus::Failed
                | StepStatus::Cancelled
                | StepStatus::Skipped
                | StepStatus::Timeout
        )
    }

    /// `RunStep` is valid from these statuses.
    pub fn can_run(&self) -> bool {
        matches!(
            self,
            StepStatus::Pending | StepStatus::Failed | StepStatus::Blocked
        )
    }

    /// `RetryStep` is valid from these statuses.
    pub fn can_retry(&self) -> bool {
        matches!(
            self,
            StepStatus::Failed | StepStatus::Timeout | StepStatus::Blocked
        )
    }

    /// Statuses that keep a protocol from being considered settled.
    pub fn holds_protocol_open(&self) -> bool {
        matches!(
            self,
            StepStatus::Pending | StepStatus::Running | StepStatus::NeedsQa | StepStatus::Blocked
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::NeedsQa => "needs_qa",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Timeout => "timeout",
            StepStatus::Cancelled => "cancelled",
            StepStatus::Skipped => "skipped",
            StepStatus::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

/// Status of a job run (one dispatch to an executor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Map a webhook status string to a job status.
    ///
    /// Unknown strings map to `None`; the webhook handler drops those
    /// deliveries without failing the caller.
    pub fn from_webhook(status: &str) -> Option<JobStatus> {
        match status {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "success" | "completed" => Some(JobStatus::Succeeded),
            "failure" | "failed" => Some(JobStatus::Failed),
            "cancelled" | "canceled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
