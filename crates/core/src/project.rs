// SPDX-License-Identifier: MIT

//! Project records.

use crate::status::InvalidTransition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_row_id! {
    /// Unique identifier for a project.
    pub struct ProjectId;
}

/// Project archival state. Archiving is reversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A repository onboarded into the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    pub base_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constitution_hash: Option<String>,
    /// Per-project policy (gate selection, auto-fix budget, engine defaults).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_overrides: Option<serde_json::Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Project {
    pub fn is_archived(&self) -> bool {
        self.status == ProjectStatus::Archived
    }

    /// Archive the project. Archiving an archived project is rejected.
    pub fn archive(&self) -> Result<ProjectStatus, InvalidTransition> {
        match self.status {
            ProjectStatus::Active => Ok(ProjectStatus::Archived),
            ProjectStatus::Archived => Err(InvalidTransition::new("project", self.status, "archive")),
        }
    }

    /// Reverse an archive.
    pub fn unarchive(&self) -> Result<ProjectStatus, InvalidTransition> {
        match self.status {
            ProjectStatus::Archived => Ok(ProjectStatus::Active),
            ProjectStatus::Active => {
                Err(InvalidTransition::new("project", self.status, "unarchive"))
            }
        }
    }

    /// Engine default for a pipeline stage from `policy_overrides`
    /// (`{"engine_defaults": {"code_gen": "...", "qa": "..."}}`).
    pub fn engine_default_for(&self, stage: &str) -> Option<String> {
        self.policy_overrides
            .as_ref()?
            .get("engine_defaults")?
            .get(stage)?
            .as_str()
            .map(str::to_string)
    }

    /// Auto-fix attempt budget from `policy_overrides`, if configured.
    pub fn qa_max_auto_fix_attempts(&self) -> Option<u32> {
        self.policy_overrides
            .as_ref()?
            .get("qa_max_auto_fix_attempts")?
            .as_u64()
            .map(|n| n as u32)
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
