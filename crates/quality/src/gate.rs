// SPDX-License-Identifier: MIT

//! The gate contract: context, trait, and outcome helpers.

use dg_core::{GateOutcome, Verdict};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories never inspected by gates.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".venv",
    "__pycache__",
    ".git",
    "dist",
    "build",
    ".tox",
    "target",
    "vendor",
];

/// Errors escaping a gate. The registry converts them to `error`
/// results; they never abort an evaluation.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Inputs a gate evaluates against. Gates read only files under
/// `workspace_root`.
#[derive(Debug, Clone)]
pub struct GateContext {
    pub workspace_root: PathBuf,
    pub protocol_root: Option<PathBuf>,
    pub step_name: Option<String>,
    pub step_type: Option<String>,
    /// Directory names skipped during workspace walks.
    pub excluded_dirs: Vec<String>,
}

impl GateContext {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            protocol_root: None,
            step_name: None,
            step_type: None,
            excluded_dirs: EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_protocol_root(mut self, protocol_root: impl Into<PathBuf>) -> Self {
        self.protocol_root = Some(protocol_root.into());
        self
    }

    pub fn with_step(mut self, name: impl Into<String>, step_type: impl Into<String>) -> Self {
        self.step_name = Some(name.into());
        self.step_type = Some(step_type.into());
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| self.excluded_dirs.iter().any(|d| d == name))
            .unwrap_or(false)
    }

    /// All regular files under the workspace root, excluded dirs
    /// skipped, in stable (sorted) order.
    pub fn walk_files(&self) -> Result<Vec<PathBuf>, GateError> {
        let mut files = Vec::new();
        let mut stack = vec![self.workspace_root.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                // The workspace may disappear under us; treat as empty.
                Err(_) if dir == self.workspace_root => return Ok(files),
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    if !self.is_excluded(&path) {
                        stack.push(path);
                    }
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Workspace files with one of the given extensions.
    pub fn files_with_extension(&self, extensions: &[&str]) -> Result<Vec<PathBuf>, GateError> {
        Ok(self
            .walk_files()?
            .into_iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| extensions.contains(&e))
                    .unwrap_or(false)
            })
            .collect())
    }
}

/// A pluggable quality check.
pub trait Gate: Send + Sync {
    fn gate_id(&self) -> &str;

    fn gate_name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    /// Whether a failing verdict from this gate blocks the step.
    fn blocking(&self) -> bool {
        true
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError>;

    /// Build an outcome for this gate.
    fn outcome(&self, verdict: Verdict, findings: Vec<dg_core::Finding>) -> GateOutcome {
        GateOutcome {
            gate_id: self.gate_id().to_string(),
            gate_name: self.gate_name().to_string(),
            verdict,
            findings,
            metadata: None,
            duration_ms: 0,
            error: None,
        }
    }

    /// Outcome for a disabled or inapplicable gate.
    fn skip_outcome(&self, reason: &str) -> GateOutcome {
        GateOutcome {
            gate_id: self.gate_id().to_string(),
            gate_name: self.gate_name().to_string(),
            verdict: Verdict::Skip,
            findings: Vec::new(),
            metadata: Some(serde_json::json!({ "reason": reason })),
            duration_ms: 0,
            error: None,
        }
    }

    /// Outcome for a gate that blew up.
    fn error_outcome(&self, error: &str) -> GateOutcome {
        GateOutcome {
            gate_id: self.gate_id().to_string(),
            gate_name: self.gate_name().to_string(),
            verdict: Verdict::Error,
            findings: Vec::new(),
            metadata: None,
            duration_ms: 0,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
