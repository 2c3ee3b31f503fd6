// SPDX-License-Identifier: MIT

//! Anti-abstraction gate.
//!
//! Flags speculative indirection: wrapper/manager/factory classes and
//! abstract bases with a single concrete implementation.

use super::{is_test_file, read_text};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use regex::Regex;
use std::collections::HashMap;

/// Detects abstraction layers with no second implementation.
pub struct AntiAbstractionGate {
    enabled: bool,
    wrapper_class: Regex,
    abstract_base: Regex,
    subclass: Regex,
}

impl Default for AntiAbstractionGate {
    fn default() -> Self {
        #[allow(clippy::expect_used)]
        Self {
            enabled: true,
            wrapper_class: Regex::new(r"class\s+(\w+(?:Wrapper|Proxy|Factory|Impl))\b")
                .expect("static regex"),
            abstract_base: Regex::new(r"class\s+(\w+)\s*\(\s*(?:ABC|abc\.ABC)\s*\)")
                .expect("static regex"),
            subclass: Regex::new(r"class\s+\w+\s*\(\s*(\w+)\s*\)").expect("static regex"),
        }
    }
}

impl Gate for AntiAbstractionGate {
    fn gate_id(&self) -> &str {
        "anti_abstraction"
    }

    fn gate_name(&self) -> &str {
        "Anti-Abstraction"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn blocking(&self) -> bool {
        false
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let mut findings = Vec::new();
        // abstract base name -> (file, line)
        let mut bases: HashMap<String, (std::path::PathBuf, u32)> = HashMap::new();
        // base name -> number of subclasses seen anywhere
        let mut subclass_counts: HashMap<String, usize> = HashMap::new();

        for path in ctx.files_with_extension(&["py"])? {
            if is_test_file(&path) {
                continue;
            }
            let Some(text) = read_text(&path) else {
                continue;
            };
            for (number, line) in text.lines().enumerate() {
                if let Some(caps) = self.wrapper_class.captures(line) {
                    findings.push(
                        Finding::new(
                            self.gate_id(),
                            Severity::Warning,
                            format!("wrapper-style class '{}'", &caps[1]),
                        )
                        .at(path.clone(), number as u32 + 1)
                        .with_rule("article-ix-anti-abstraction")
                        .with_suggestion("use the wrapped type directly until a second use exists"),
                    );
                }
                if let Some(caps) = self.abstract_base.captures(line) {
                    bases.insert(caps[1].to_string(), (path.clone(), number as u32 + 1));
                }
                if let Some(caps) = self.subclass.captures(line) {
                    *subclass_counts.entry(caps[1].to_string()).or_insert(0) += 1;
                }
            }
        }

        for (base, (path, line)) in bases {
            let implementations = subclass_counts.get(&base).copied().unwrap_or(0);
            if implementations <= 1 {
                findings.push(
                    Finding::new(
                        self.gate_id(),
                        Severity::Warning,
                        format!(
                            "abstract base '{base}' has {implementations} implementation(s)"
                        ),
                    )
                    .at(path, line)
                    .with_rule("article-ix-single-implementation")
                    .with_suggestion("inline the base until a second implementation appears"),
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
#[path = "anti_abstraction_tests.rs"]
mod tests;
