// SPDX-License-Identifier: MIT

//! Specification run records.
//!
//! A spec run tracks a specification document's lifecycle; protocol runs
//! derived from a spec reference it through their template config.

use crate::project::ProjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_row_id! {
    /// Unique identifier for a spec run.
    pub struct SpecRunId;
}

/// Stages of the specification workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecRunStatus {
    Specifying,
    Specified,
    Planning,
    Planned,
    Tasks,
    Clarified,
    Checklisted,
    Analyzed,
    Implemented,
    Failed,
    Cleaned,
}

impl SpecRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SpecRunStatus::Implemented | SpecRunStatus::Failed | SpecRunStatus::Cleaned
        )
    }
}

impl fmt::Display for SpecRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpecRunStatus::Specifying => "specifying",
            SpecRunStatus::Specified => "specified",
            SpecRunStatus::Planning => "planning",
            SpecRunStatus::Planned => "planned",
            SpecRunStatus::Tasks => "tasks",
            SpecRunStatus::Clarified => "clarified",
            SpecRunStatus::Checklisted => "checklisted",
            SpecRunStatus::Analyzed => "analyzed",
            SpecRunStatus::Implemented => "implemented",
            SpecRunStatus::Failed => "failed",
            SpecRunStatus::Cleaned => "cleaned",
        };
        write!(f, "{s}")
    }
}

/// One specification lifecycle within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecRun {
    pub id: SpecRunId,
    pub project_id: ProjectId,
    pub spec_name: String,
    pub status: SpecRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

#[cfg(test)]
#[path = "spec_run_tests.rs"]
mod tests;
