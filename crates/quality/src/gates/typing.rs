// SPDX-License-Identifier: MIT

//! Type hygiene gate.

use super::{is_test_file, read_text};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use regex::Regex;

/// Flags untyped public Python signatures and `any` leakage in
/// TypeScript sources.
pub struct TypeGate {
    enabled: bool,
    py_def: Regex,
    ts_any: Regex,
}

impl Default for TypeGate {
    fn default() -> Self {
        #[allow(clippy::expect_used)]
        Self {
            enabled: true,
            py_def: Regex::new(r"^\s*def\s+([a-z]\w*)\s*\(([^)]*)\)\s*(->\s*[^:]+)?:")
                .expect("static regex"),
            ts_any: Regex::new(r":\s*any\b").expect("static regex"),
        }
    }
}

impl TypeGate {
    fn python_findings(&self, path: &std::path::Path, text: &str, findings: &mut Vec<Finding>) {
        for (number, line) in text.lines().enumerate() {
            let Some(caps) = self.py_def.captures(line) else {
                continue;
            };
            let name = &caps[1];
            if name.starts_with('_') {
                continue;
            }
            let params = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let has_return = caps.get(3).is_some();
            let bare_params = params
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty() && *p != "self" && *p != "cls")
                .any(|p| !p.contains(':'));
            if bare_params || !has_return {
                findings.push(
                    Finding::new(
                        self.gate_id(),
                        Severity::Warning,
                        format!("public function '{name}' is missing type annotations"),
                    )
                    .at(path.to_path_buf(), number as u32 + 1)
                    .with_rule("missing-annotation"),
                );
            }
        }
    }

    fn typescript_findings(&self, path: &std::path::Path, text: &str, findings: &mut Vec<Finding>) {
        for (number, line) in text.lines().enumerate() {
            if self.ts_any.is_match(line) {
                findings.push(
                    Finding::new(self.gate_id(), Severity::Warning, "explicit 'any' type")
                        .at(path.to_path_buf(), number as u32 + 1)
                        .with_rule("explicit-any"),
                );
            }
        }
    }
}

impl Gate for TypeGate {
    fn gate_id(&self) -> &str {
        "type"
    }

    fn gate_name(&self) -> &str {
        "Type Safety"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn blocking(&self) -> bool {
        false
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let mut findings = Vec::new();
        let mut inspected = 0usize;

        for path in ctx.files_with_extension(&["py", "ts", "tsx"])? {
            if is_test_file(&path) {
                continue;
            }
            let Some(text) = read_text(&path) else {
                continue;
            };
            inspected += 1;
            match path.extension().and_then(|e| e.to_str()) {
                Some("py") => self.python_findings(&path, &text, &mut findings),
                Some("ts") | Some("tsx") => self.typescript_findings(&path, &text, &mut findings),
                _ => {}
            }
        }

        if inspected == 0 {
            return Ok(self.skip_outcome("no typed-language sources in workspace"));
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
#[path = "typing_tests.rs"]
mod tests;
