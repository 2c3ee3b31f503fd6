// SPDX-License-Identifier: MIT

//! Feedback routing: classifies QA findings and decides which failures
//! the auto-fix loop may take on.

use dg_core::Finding;
use serde::{Deserialize, Serialize};

/// Category a finding routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Lint,
    Format,
    Test,
    TypeSafety,
    Security,
    Coverage,
    Constitutional,
    Other,
}

/// Routes findings to handling categories.
#[derive(Default)]
pub struct FeedbackRouter;

impl FeedbackRouter {
    pub fn new() -> Self {
        Self
    }

    /// Category from the gate that produced the finding.
    pub fn classify(&self, finding: &Finding) -> ErrorCategory {
        match finding.gate_id.as_str() {
            "lint" => ErrorCategory::Lint,
            "format" => ErrorCategory::Format,
            "test" | "test_first" => ErrorCategory::Test,
            "type" => ErrorCategory::TypeSafety,
            "security" => ErrorCategory::Security,
            "coverage" => ErrorCategory::Coverage,
            "library_first" | "simplicity" | "anti_abstraction" => {
                ErrorCategory::Constitutional
            }
            _ => ErrorCategory::Other,
        }
    }

    /// Auto-fixable findings come from mechanical categories (lint,
    /// format) and carry a known rule id an agent can act on.
    pub fn is_auto_fixable(&self, finding: &Finding) -> bool {
        let category = self.classify(finding);
        matches!(category, ErrorCategory::Lint | ErrorCategory::Format)
            && finding.rule_id.is_some()
    }

    /// Whether the whole failing evaluation qualifies for the auto-fix
    /// loop: every blocking finding must be auto-fixable.
    pub fn all_blocking_auto_fixable(&self, findings: &[Finding]) -> bool {
        let blocking: Vec<&Finding> = findings.iter().filter(|f| f.is_blocking()).collect();
        !blocking.is_empty() && blocking.iter().all(|f| self.is_auto_fixable(f))
    }
}

#[cfg(test)]
#[path = "feedback_tests.rs"]
mod tests;
