// SPDX-License-Identifier: MIT

//! Lint gate: debug leftovers and hygiene issues.

use super::{is_test_file, read_text, SOURCE_EXTENSIONS};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use regex::Regex;

/// Flags debug statements, stray TODO/FIXME markers, and trailing
/// whitespace in non-test source files.
pub struct LintGate {
    enabled: bool,
    debug_patterns: Vec<(Regex, &'static str)>,
}

impl Default for LintGate {
    fn default() -> Self {
        #[allow(clippy::expect_used)]
        let debug_patterns = vec![
            (
                Regex::new(r"console\.(log|debug)\(").expect("static regex"),
                "debug-statement",
            ),
            (
                Regex::new(r"^\s*print\(").expect("static regex"),
                "debug-statement",
            ),
            (
                Regex::new(r"\bdbg!\(").expect("static regex"),
                "debug-statement",
            ),
            (
                Regex::new(r"\b(TODO|FIXME|XXX)\b").expect("static regex"),
                "todo-comment",
            ),
        ];
        Self {
            enabled: true,
            debug_patterns,
        }
    }
}

impl Gate for LintGate {
    fn gate_id(&self) -> &str {
        "lint"
    }

    fn gate_name(&self) -> &str {
        "Lint"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn blocking(&self) -> bool {
        false
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let mut findings = Vec::new();

        for path in ctx.files_with_extension(SOURCE_EXTENSIONS)? {
            if is_test_file(&path) {
                continue;
            }
            let Some(text) = read_text(&path) else {
                continue;
            };
            let is_python = path.extension().and_then(|e| e.to_str()) == Some("py");

            for (number, line) in text.lines().enumerate() {
                for (pattern, rule) in &self.debug_patterns {
                    // print() is only a debug marker in Python sources.
                    if *rule == "debug-statement"
                        && pattern.as_str().contains("print")
                        && !is_python
                    {
                        continue;
                    }
                    if pattern.is_match(line) {
                        findings.push(
                            Finding::new(
                                self.gate_id(),
                                Severity::Warning,
                                format!("{rule}: {}", line.trim()),
                            )
                            .at(path.clone(), number as u32 + 1)
                            .with_rule(*rule),
                        );
                    }
                }
                if line.len() != line.trim_end().len() {
                    findings.push(
                        Finding::new(self.gate_id(), Severity::Info, "trailing whitespace")
                            .at(path.clone(), number as u32 + 1)
                            .with_rule("trailing-whitespace"),
                    );
                }
            }
        }

        let verdict = if findings
            .iter()
            .any(|f| f.rule_id.as_deref() == Some("debug-statement"))
        {
            Verdict::Warn
        } else if findings.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Warn
        };
        Ok(self.outcome(verdict, findings))
    }
}

#[cfg(test)]
#[path = "lint_tests.rs"]
mod tests;
