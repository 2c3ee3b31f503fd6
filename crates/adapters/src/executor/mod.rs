// SPDX-License-Identifier: MIT

//! External executor adapter.
//!
//! The executor (Windmill) owns job queuing and execution; this adapter
//! is the only external dependency exercised in production workflows.
//! Reconciliation treats its answers as authoritative.

mod windmill;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use windmill::{WindmillConfig, WindmillExecutor};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Job status vocabulary of the external executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalJobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Anything the executor reports that we do not model.
    #[serde(other)]
    Unknown,
}

impl ExternalJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExternalJobStatus::Completed
                | ExternalJobStatus::Failed
                | ExternalJobStatus::Cancelled
        )
    }
}

impl fmt::Display for ExternalJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExternalJobStatus::Queued => "queued",
            ExternalJobStatus::Running => "running",
            ExternalJobStatus::Completed => "completed",
            ExternalJobStatus::Failed => "failed",
            ExternalJobStatus::Cancelled => "cancelled",
            ExternalJobStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A job as the executor reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalJob {
    pub id: String,
    pub status: ExternalJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Flow listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Filters for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub script_path: Option<String>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

/// Errors from executor calls
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("executor API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

/// Contract the core depends on.
#[async_trait]
pub trait ExecutorAdapter: Send + Sync {
    async fn list_flows(&self, prefix: Option<&str>) -> Result<Vec<FlowSummary>, ExecutorError>;

    async fn get_flow(&self, path: &str) -> Result<FlowSummary, ExecutorError>;

    /// Submit a script run; returns the executor-assigned job id.
    async fn run_script(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<String, ExecutorError>;

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<ExternalJob>, ExecutorError>;

    async fn get_job(&self, job_id: &str) -> Result<ExternalJob, ExecutorError>;

    async fn get_job_logs(&self, job_id: &str) -> Result<String, ExecutorError>;

    async fn health_check(&self) -> Result<(), ExecutorError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
