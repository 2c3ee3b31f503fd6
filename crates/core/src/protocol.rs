// SPDX-License-Identifier: MIT

//! Protocol run and step run records.

use crate::project::ProjectId;
use crate::status::{ProtocolStatus, StepStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_row_id! {
    /// Unique identifier for a protocol run.
    ///
    /// One protocol run is one end-to-end attempt to drive a repository
    /// through the pipeline for a named protocol.
    pub struct ProtocolRunId;
}

crate::define_row_id! {
    /// Unique identifier for a step run.
    pub struct StepRunId;
}

/// A protocol run owned by a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRun {
    pub id: ProtocolRunId,
    pub project_id: ProjectId,
    pub protocol_name: String,
    pub status: ProtocolStatus,
    pub base_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_root: Option<PathBuf>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windmill_flow_id: Option<String>,
    /// Step seeding template supplied at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_config: Option<serde_json::Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl ProtocolRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Step definition inside a protocol template config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub step_name: String,
    pub step_type: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl StepTemplate {
    /// Parse the `steps` list out of a protocol template config.
    pub fn from_template_config(config: &serde_json::Value) -> Vec<StepTemplate> {
        config
            .get("steps")
            .and_then(|v| v.as_array())
            .map(|steps| {
                steps
                    .iter()
                    .filter_map(|s| serde_json::from_value(s.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One unit of work within a protocol run (plan, execute, QA, PR, ...).
///
/// Steps are ordered within their protocol by `(step_index, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRun {
    pub id: StepRunId,
    pub protocol_run_id: ProtocolRunId,
    pub step_index: u32,
    pub step_name: String,
    pub step_type: String,
    pub status: StepStatus,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Scratch state that survives restarts: retry counters, auto-fix
    /// attempts, last dispatch info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_state: Option<serde_json::Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl StepRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Slug used for the step prompt file name: lowercased, with runs of
    /// non-alphanumerics collapsed to a single `-`.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.step_name.len());
        let mut last_dash = true;
        for c in self.step_name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        slug
    }

    /// Prompt file name under the protocol root.
    pub fn prompt_file_name(&self) -> String {
        format!("step-{}-{}.md", self.step_index, self.slug())
    }

    fn runtime_counter(&self, key: &str) -> u32 {
        self.runtime_state
            .as_ref()
            .and_then(|s| s.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }

    /// Cumulative retry count, kept in `runtime_state`.
    pub fn retry_count(&self) -> u32 {
        self.runtime_counter("retry_count")
    }

    /// Auto-fix attempts consumed so far, kept in `runtime_state`.
    pub fn auto_fix_attempts(&self) -> u32 {
        self.runtime_counter("auto_fix_attempts")
    }

    /// Return `runtime_state` with `key` incremented by one.
    pub fn runtime_state_with_incremented(&self, key: &str) -> serde_json::Value {
        let mut state = self
            .runtime_state
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        let next = self.runtime_counter(key) + 1;
        if let Some(map) = state.as_object_mut() {
            map.insert(key.to_string(), serde_json::json!(next));
        }
        state
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
