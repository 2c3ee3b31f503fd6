// SPDX-License-Identifier: MIT

//! Security gate: hardcoded secrets and dangerous calls.
//!
//! External scanners (bandit, npm-audit) run inside the executor; this
//! gate reads their JSON reports when present and always applies its own
//! secret/dangerous-call scan on top.

use super::{is_test_file, read_text, SOURCE_EXTENSIONS};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use regex::Regex;

/// Scans sources for secrets and dangerous constructs.
pub struct SecurityGate {
    enabled: bool,
    secret_patterns: Vec<(Regex, &'static str)>,
    danger_patterns: Vec<(Regex, &'static str)>,
}

impl Default for SecurityGate {
    fn default() -> Self {
        #[allow(clippy::expect_used)]
        let secret_patterns = vec![
            (
                Regex::new(r"AKIA[0-9A-Z]{16}").expect("static regex"),
                "aws-access-key",
            ),
            (
                Regex::new(r#"(?i)(password|passwd|secret|api_key|apikey|token)\s*[:=]\s*["'][^"']{8,}["']"#)
                    .expect("static regex"),
                "hardcoded-secret",
            ),
            (
                Regex::new(r"-----BEGIN (RSA |EC |OPENSSH )?PRIVATE KEY-----")
                    .expect("static regex"),
                "private-key",
            ),
        ];
        #[allow(clippy::expect_used)]
        let danger_patterns = vec![
            (
                Regex::new(r"\beval\s*\(").expect("static regex"),
                "eval-call",
            ),
            (
                Regex::new(r"\bexec\s*\(").expect("static regex"),
                "exec-call",
            ),
            (
                Regex::new(r"shell\s*=\s*True").expect("static regex"),
                "shell-injection",
            ),
            (
                Regex::new(r"os\.system\s*\(").expect("static regex"),
                "os-system",
            ),
        ];
        Self {
            enabled: true,
            secret_patterns,
            danger_patterns,
        }
    }
}

impl SecurityGate {
    /// Findings from a bandit/npm-audit style report file, when the
    /// executor left one behind.
    fn report_findings(&self, ctx: &GateContext, findings: &mut Vec<Finding>) {
        let path = ctx.workspace_root.join("security-report.json");
        let Some(text) = read_text(&path) else {
            return;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            return;
        };
        let Some(results) = value.get("results").and_then(|r| r.as_array()) else {
            return;
        };
        for result in results {
            let message = result
                .get("issue_text")
                .and_then(|m| m.as_str())
                .unwrap_or("reported security issue");
            let severity = match result
                .get("issue_severity")
                .and_then(|s| s.as_str())
                .unwrap_or("MEDIUM")
            {
                "HIGH" | "CRITICAL" => Severity::Critical,
                "MEDIUM" => Severity::Error,
                _ => Severity::Warning,
            };
            let mut finding =
                Finding::new(self.gate_id(), severity, message).with_rule("scanner-report");
            if let Some(file) = result.get("filename").and_then(|f| f.as_str()) {
                let line = result
                    .get("line_number")
                    .and_then(|l| l.as_u64())
                    .unwrap_or(1) as u32;
                finding = finding.at(file, line);
            }
            findings.push(finding);
        }
    }
}

impl Gate for SecurityGate {
    fn gate_id(&self) -> &str {
        "security"
    }

    fn gate_name(&self) -> &str {
        "Security"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let mut findings = Vec::new();
        self.report_findings(ctx, &mut findings);

        for path in ctx.files_with_extension(SOURCE_EXTENSIONS)? {
            if is_test_file(&path) {
                continue;
            }
            let Some(text) = read_text(&path) else {
                continue;
            };
            for (number, line) in text.lines().enumerate() {
                for (pattern, rule) in &self.secret_patterns {
                    if pattern.is_match(line) {
                        findings.push(
                            Finding::new(
                                self.gate_id(),
                                Severity::Critical,
                                format!("possible secret in source ({rule})"),
                            )
                            .at(path.clone(), number as u32 + 1)
                            .with_rule(*rule)
                            .with_suggestion("move the value into configuration or a secret store"),
                        );
                    }
                }
                for (pattern, rule) in &self.danger_patterns {
                    if pattern.is_match(line) {
                        findings.push(
                            Finding::new(
                                self.gate_id(),
                                Severity::Error,
                                format!("dangerous call ({rule})"),
                            )
                            .at(path.clone(), number as u32 + 1)
                            .with_rule(*rule),
                        );
                    }
                }
            }
        }

        let verdict = if findings.iter().any(|f| f.is_blocking()) {
            Verdict::Fail
        } else if findings.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Warn
        };
        let mut outcome = self.outcome(verdict, findings);
        outcome.metadata = Some(serde_json::json!({
            "secret_rules": self.secret_patterns.len(),
            "danger_rules": self.danger_patterns.len(),
        }));
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "security_tests.rs"]
mod tests;
