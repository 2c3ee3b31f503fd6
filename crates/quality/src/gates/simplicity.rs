// SPDX-License-Identifier: MIT

//! Simplicity gate: size and nesting ceilings.

use super::{is_test_file, read_text, SOURCE_EXTENSIONS};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};

const MAX_FILE_LINES: usize = 500;
const MAX_NESTING_DEPTH: usize = 6;
const INDENT_WIDTH: usize = 4;

/// Flags overlong files and deeply nested code.
pub struct SimplicityGate {
    enabled: bool,
    max_file_lines: usize,
    max_nesting_depth: usize,
}

impl Default for SimplicityGate {
    fn default() -> Self {
        Self {
            enabled: true,
            max_file_lines: MAX_FILE_LINES,
            max_nesting_depth: MAX_NESTING_DEPTH,
        }
    }
}

fn indent_depth(line: &str) -> usize {
    let mut columns = 0usize;
    for c in line.chars() {
        match c {
            ' ' => columns += 1,
            '\t' => columns += INDENT_WIDTH,
            _ => break,
        }
    }
    columns / INDENT_WIDTH
}

impl Gate for SimplicityGate {
    fn gate_id(&self) -> &str {
        "simplicity"
    }

    fn gate_name(&self) -> &str {
        "Simplicity"
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

            let line_count = text.lines().count();
            if line_count > self.max_file_lines {
                findings.push(
                    Finding::new(
                        self.gate_id(),
                        Severity::Warning,
                        format!(
                            "file has {line_count} lines (ceiling {})",
                            self.max_file_lines
                        ),
                    )
                    .at(path.clone(), 1)
                    .with_rule("article-vii-file-length")
                    .with_suggestion("split the file along its responsibilities"),
                );
            }

            for (number, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let depth = indent_depth(line);
                if depth > self.max_nesting_depth {
                    findings.push(
                        Finding::new(
                            self.gate_id(),
                            Severity::Warning,
                            format!(
                                "nesting depth {depth} exceeds {}",
                                self.max_nesting_depth
                            ),
                        )
                        .at(path.clone(), number as u32 + 1)
                        .with_rule("article-vii-nesting-depth")
                        .with_suggestion("extract a function or use early returns"),
                    );
                    // One finding per file keeps the report readable.
                    break;
                }
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
#[path = "simplicity_tests.rs"]
mod tests;
