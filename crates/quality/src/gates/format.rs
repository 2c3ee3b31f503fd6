// SPDX-License-Identifier: MIT

//! Formatting gate.

use super::{read_text, SOURCE_EXTENSIONS};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};

const MAX_LINE_LENGTH: usize = 120;

/// Flags mixed indentation within a file and overlong lines.
pub struct FormatGate {
    enabled: bool,
    max_line_length: usize,
}

impl Default for FormatGate {
    fn default() -> Self {
        Self {
            enabled: true,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl Gate for FormatGate {
    fn gate_id(&self) -> &str {
        "format"
    }

    fn gate_name(&self) -> &str {
        "Formatting"
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
            let Some(text) = read_text(&path) else {
                continue;
            };

            let mut saw_tabs = false;
            let mut saw_spaces = false;
            for (number, line) in text.lines().enumerate() {
                if line.starts_with('\t') {
                    saw_tabs = true;
                } else if line.starts_with(' ') {
                    saw_spaces = true;
                }
                if line.chars().count() > self.max_line_length {
                    findings.push(
                        Finding::new(
                            self.gate_id(),
                            Severity::Info,
                            format!("line exceeds {} characters", self.max_line_length),
                        )
                        .at(path.clone(), number as u32 + 1)
                        .with_rule("line-length"),
                    );
                }
            }
            if saw_tabs && saw_spaces {
                findings.push(
                    Finding::new(
                        self.gate_id(),
                        Severity::Warning,
                        "mixed tab and space indentation",
                    )
                    .at(path.clone(), 1)
                    .with_rule("mixed-indentation"),
                );
            }
        }

        let verdict = if findings.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Warn
        };
        Ok(self.outcome(verdict, findings))
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
