// SPDX-License-Identifier: MIT

//! Artifact records: files produced by step execution.

use crate::id::RunId;
use crate::protocol::StepRunId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_row_id! {
    /// Unique identifier for an artifact.
    pub struct ArtifactId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Log,
    Diff,
    Report,
    Json,
    Text,
    File,
}

impl ArtifactKind {
    /// Infer the kind from a file name.
    pub fn from_name(name: &str) -> ArtifactKind {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".log") || lower.contains("log") {
            ArtifactKind::Log
        } else if lower.ends_with(".diff") || lower.ends_with(".patch") {
            ArtifactKind::Diff
        } else if lower.ends_with(".md") && (lower.contains("report") || lower.contains("qa")) {
            ArtifactKind::Report
        } else if lower.ends_with(".json") {
            ArtifactKind::Json
        } else if lower.ends_with(".txt") || lower.ends_with(".md") {
            ArtifactKind::Text
        } else {
            ArtifactKind::File
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Log => "log",
            ArtifactKind::Diff => "diff",
            ArtifactKind::Report => "report",
            ArtifactKind::Json => "json",
            ArtifactKind::Text => "text",
            ArtifactKind::File => "file",
        };
        write!(f, "{s}")
    }
}

/// A file on the workspace produced by a run or step. Immutable after
/// the write that created it; concurrent writers are kept apart by
/// step-scoped artifact directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_run_id: Option<StepRunId>,
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    pub created_at_ms: u64,
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
