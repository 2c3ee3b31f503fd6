// SPDX-License-Identifier: MIT

//! Test presence gate.

use super::{is_test_file, SOURCE_EXTENSIONS};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};

/// Checks that the workspace carries tests at all.
///
/// A workspace with source files and zero test files fails; a workspace
/// with no source files (docs-only change) is skipped.
pub struct TestGate {
    enabled: bool,
}

impl Default for TestGate {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Gate for TestGate {
    fn gate_id(&self) -> &str {
        "test"
    }

    fn gate_name(&self) -> &str {
        "Test Presence"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let sources = ctx.files_with_extension(SOURCE_EXTENSIONS)?;
        if sources.is_empty() {
            return Ok(self.skip_outcome("no source files in workspace"));
        }

        let (tests, code): (Vec<_>, Vec<_>) =
            sources.into_iter().partition(|p| is_test_file(p));

        let mut outcome = if tests.is_empty() {
            self.outcome(
                Verdict::Fail,
                vec![Finding::new(
                    self.gate_id(),
                    Severity::Error,
                    format!("{} source files but no test files found", code.len()),
                )
                .with_rule("missing-tests")
                .with_suggestion("add tests alongside the changed code")],
            )
        } else {
            self.outcome(Verdict::Pass, vec![])
        };
        outcome.metadata = Some(serde_json::json!({
            "source_files": code.len(),
            "test_files": tests.len(),
        }));
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "test_tests.rs"]
mod tests;
