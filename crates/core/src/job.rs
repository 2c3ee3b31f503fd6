// SPDX-License-Identifier: MIT

//! Job run records: durable evidence of a dispatch.

use crate::id::RunId;
use crate::project::ProjectId;
use crate::protocol::{ProtocolRunId, StepRunId};
use crate::status::JobStatus;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A durable record of one dispatch to an executor.
///
/// Multiple job runs may map to one step run (retries). The row is
/// created before any side effect so a crash mid-dispatch leaves
/// evidence for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: RunId,
    pub job_type: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_run_id: Option<ProtocolRunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_run_id: Option<StepRunId>,
    /// Id assigned by the external executor; unique across the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windmill_job_id: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl JobRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
