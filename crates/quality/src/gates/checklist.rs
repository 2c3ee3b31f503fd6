// SPDX-License-Identifier: MIT

//! Checklist gate: markdown checkbox completion.

use super::read_text;
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use std::path::PathBuf;

/// Verifies that the step's checklist has no unchecked items.
///
/// Looks for `checklist.md` under the protocol root first, then the
/// workspace root. No checklist means skip.
pub struct ChecklistGate {
    enabled: bool,
}

impl Default for ChecklistGate {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ChecklistGate {
    fn checklist_path(&self, ctx: &GateContext) -> Option<PathBuf> {
        let candidates = [
            ctx.protocol_root
                .as_ref()
                .map(|root| root.join("checklist.md")),
            Some(ctx.workspace_root.join("checklist.md")),
        ];
        candidates.into_iter().flatten().find(|p| p.is_file())
    }
}

impl Gate for ChecklistGate {
    fn gate_id(&self) -> &str {
        "checklist"
    }

    fn gate_name(&self) -> &str {
        "Checklist"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let Some(path) = self.checklist_path(ctx) else {
            return Ok(self.skip_outcome("no checklist.md found"));
        };
        let Some(text) = read_text(&path) else {
            return Ok(self.skip_outcome("checklist.md unreadable"));
        };

        let mut total = 0usize;
        let mut findings = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            let unchecked = trimmed.starts_with("- [ ]") || trimmed.starts_with("* [ ]");
            let checked = trimmed.starts_with("- [x]")
                || trimmed.starts_with("- [X]")
                || trimmed.starts_with("* [x]")
                || trimmed.starts_with("* [X]");
            if unchecked || checked {
                total += 1;
            }
            if unchecked {
                let item = trimmed
                    .trim_start_matches("- [ ]")
                    .trim_start_matches("* [ ]")
                    .trim();
                findings.push(
                    Finding::new(
                        self.gate_id(),
                        Severity::Error,
                        format!("unchecked checklist item: {item}"),
                    )
                    .at(path.clone(), number as u32 + 1)
                    .with_rule("unchecked-item"),
                );
            }
        }

        if total == 0 {
            return Ok(self.skip_outcome("checklist.md has no checkbox items"));
        }

        let mut outcome = if findings.is_empty() {
            self.outcome(Verdict::Pass, vec![])
        } else {
            self.outcome(Verdict::Fail, findings)
        };
        outcome.metadata = Some(serde_json::json!({
            "total_items": total,
            "path": path.display().to_string(),
        }));
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "checklist_tests.rs"]
mod tests;
