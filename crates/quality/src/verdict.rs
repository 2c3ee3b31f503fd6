// SPDX-License-Identifier: MIT

//! Verdict aggregation across gate outcomes.

use dg_core::{GateOutcome, Verdict};

/// Collapse gate outcomes into one verdict.
///
/// Ordered rule: any `error` → `fail`; else any `fail` → `fail`; else
/// any `warn` → `warn`; else at least one `pass` → `pass`; else (all
/// `skip`) → `pass`; empty input → `skip`.
pub fn aggregate_verdict(outcomes: &[GateOutcome]) -> Verdict {
    if outcomes.is_empty() {
        return Verdict::Skip;
    }
    if outcomes.iter().any(|o| o.verdict == Verdict::Error) {
        return Verdict::Fail;
    }
    if outcomes.iter().any(|o| o.verdict == Verdict::Fail) {
        return Verdict::Fail;
    }
    if outcomes.iter().any(|o| o.verdict == Verdict::Warn) {
        return Verdict::Warn;
    }
    Verdict::Pass
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod tests;
