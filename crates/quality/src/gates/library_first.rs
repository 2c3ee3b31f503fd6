// SPDX-License-Identifier: MIT

//! Library-first gate.
//!
//! Detects patterns where code reinvents functionality that exists in
//! well-tested libraries.

use super::{is_test_file, read_text};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use regex::Regex;

struct ReinventionRule {
    pattern: Regex,
    library: &'static str,
    advice: &'static str,
    languages: &'static [&'static str],
}

/// Flags hand-rolled implementations of library-covered concerns.
pub struct LibraryFirstGate {
    enabled: bool,
    blocking: bool,
    rules: Vec<ReinventionRule>,
}

impl Default for LibraryFirstGate {
    fn default() -> Self {
        #[allow(clippy::expect_used)]
        let rule = |pattern: &str, library: &'static str, advice: &'static str, languages| {
            ReinventionRule {
                pattern: Regex::new(pattern).expect("static regex"),
                library,
                advice,
                languages,
            }
        };
        let rules = vec![
            rule(
                r"class\s+\w*HTTP\w*Client",
                "requests",
                "use 'requests' or 'httpx' instead of a custom HTTP client",
                &["py"],
            ),
            rule(
                r"socket\.socket\(",
                "requests",
                "use a higher-level HTTP library instead of raw sockets",
                &["py"],
            ),
            rule(
                r"def\s+parse_?json",
                "json",
                "use the built-in 'json' module",
                &["py"],
            ),
            rule(
                r"sys\.argv\[",
                "click",
                "use 'click' or 'argparse' for CLI argument parsing",
                &["py"],
            ),
            rule(
                r"class\s+\w*Validator",
                "pydantic",
                "consider 'pydantic' for data validation",
                &["py"],
            ),
            rule(
                r"function\s+deepClone",
                "lodash",
                "use 'lodash.clonedeep' for deep cloning",
                &["js", "jsx", "ts", "tsx"],
            ),
            rule(
                r"function\s+debounce",
                "lodash",
                "use 'lodash.debounce' for debouncing",
                &["js", "jsx", "ts", "tsx"],
            ),
            rule(
                r"interface\s+\w*Validator",
                "zod",
                "consider 'zod' for runtime validation",
                &["ts", "tsx"],
            ),
        ];
        Self {
            enabled: true,
            blocking: false,
            rules,
        }
    }
}

impl Gate for LibraryFirstGate {
    fn gate_id(&self) -> &str {
        "library_first"
    }

    fn gate_name(&self) -> &str {
        "Library-First"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn blocking(&self) -> bool {
        self.blocking
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let mut findings = Vec::new();

        for path in ctx.files_with_extension(&["py", "js", "jsx", "ts", "tsx"])? {
            if is_test_file(&path) {
                continue;
            }
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_string();
            let Some(text) = read_text(&path) else {
                continue;
            };
            for rule in &self.rules {
                if !rule.languages.contains(&ext.as_str()) {
                    continue;
                }
                for (number, line) in text.lines().enumerate() {
                    if rule.pattern.is_match(line) {
                        findings.push(
                            Finding::new(
                                self.gate_id(),
                                Severity::Warning,
                                format!("possible reinvention of '{}'", rule.library),
                            )
                            .at(path.clone(), number as u32 + 1)
                            .with_rule("article-i-library-first")
                            .with_suggestion(rule.advice),
                        );
                    }
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
#[path = "library_first_tests.rs"]
mod tests;
