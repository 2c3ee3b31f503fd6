// SPDX-License-Identifier: MIT

//! Coverage gate: parses coverage reports left by the test run.

use super::read_text;
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use regex::Regex;

const DEFAULT_THRESHOLD: f64 = 80.0;

/// Compares reported line coverage against a threshold.
///
/// Reads `coverage.json` (`{"totals": {"percent_covered": N}}`) or
/// `coverage.xml` (`line-rate="0.NN"`). Skips when no report exists;
/// running the coverage tool itself is the executor's job.
pub struct CoverageGate {
    enabled: bool,
    threshold: f64,
    line_rate: Regex,
}

impl Default for CoverageGate {
    fn default() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }
}

impl CoverageGate {
    pub fn with_threshold(threshold: f64) -> Self {
        #[allow(clippy::expect_used)]
        Self {
            enabled: true,
            threshold,
            line_rate: Regex::new(r#"line-rate="([0-9.]+)""#).expect("static regex"),
        }
    }

    fn percent_from_reports(&self, ctx: &GateContext) -> Option<f64> {
        let json_path = ctx.workspace_root.join("coverage.json");
        if let Some(text) = read_text(&json_path) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
                if let Some(percent) = value
                    .get("totals")
                    .and_then(|t| t.get("percent_covered"))
                    .and_then(|p| p.as_f64())
                {
                    return Some(percent);
                }
            }
        }

        let xml_path = ctx.workspace_root.join("coverage.xml");
        if let Some(text) = read_text(&xml_path) {
            if let Some(caps) = self.line_rate.captures(&text) {
                if let Ok(rate) = caps[1].parse::<f64>() {
                    return Some(rate * 100.0);
                }
            }
        }

        None
    }
}

impl Gate for CoverageGate {
    fn gate_id(&self) -> &str {
        "coverage"
    }

    fn gate_name(&self) -> &str {
        "Coverage"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let Some(percent) = self.percent_from_reports(ctx) else {
            return Ok(self.skip_outcome("no coverage report in workspace"));
        };

        let mut outcome = if percent + f64::EPSILON < self.threshold {
            self.outcome(
                Verdict::Fail,
                vec![Finding::new(
                    self.gate_id(),
                    Severity::Error,
                    format!(
                        "coverage {percent:.1}% is below the {:.1}% threshold",
                        self.threshold
                    ),
                )
                .with_rule("coverage-threshold")],
            )
        } else {
            self.outcome(Verdict::Pass, vec![])
        };
        outcome.metadata = Some(serde_json::json!({
            "percent_covered": percent,
            "threshold": self.threshold,
        }));
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "coverage_tests.rs"]
mod tests;
