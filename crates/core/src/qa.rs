// SPDX-License-Identifier: MIT

//! QA vocabulary shared by the gate pipeline and the orchestrator:
//! verdicts, findings, per-gate outcomes, and the persisted QA result.

use crate::project::ProjectId;
use crate::protocol::{ProtocolRunId, StepRunId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

crate::define_row_id! {
    /// Unique identifier for a QA result row.
    pub struct QaResultId;
}

/// Verdict of a single gate, and of a whole evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
    Skip,
    Error,
}

impl Verdict {
    /// Pass/warn/skip count as passing for step advancement.
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass | Verdict::Warn | Verdict::Skip)
    }

    /// Fail/error block the step and the protocol.
    pub fn blocking(&self) -> bool {
        matches!(self, Verdict::Fail | Verdict::Error)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Pass => "pass",
            Verdict::Warn => "warn",
            Verdict::Fail => "fail",
            Verdict::Skip => "skip",
            Verdict::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// One issue reported by a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub gate_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Finding {
    pub fn new(gate_id: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            severity,
            message: message.into(),
            file_path: None,
            line_number: None,
            rule_id: None,
            suggestion: None,
            metadata: None,
        }
    }

    pub fn at(mut self, file_path: impl Into<PathBuf>, line_number: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.line_number = Some(line_number);
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Findings at error/critical severity block a verdict.
    pub fn is_blocking(&self) -> bool {
        matches!(self.severity, Severity::Error | Severity::Critical)
    }
}

/// Result of one gate execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub gate_id: String,
    pub gate_name: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }

    pub fn blocking(&self) -> bool {
        self.verdict.blocking()
    }
}

/// Persisted result of one QA evaluation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResult {
    pub id: QaResultId,
    pub protocol_run_id: ProtocolRunId,
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_run_id: Option<StepRunId>,
    pub verdict: Verdict,
    #[serde(default)]
    pub gate_results: Vec<GateOutcome>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    pub created_at_ms: u64,
}

impl QaResult {
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }

    pub fn findings_count(&self) -> usize {
        self.findings.len()
    }
}

#[cfg(test)]
#[path = "qa_tests.rs"]
mod tests;
