// SPDX-License-Identifier: MIT

//! Test-first gate.
//!
//! Every source file should have a companion test file, and the test
//! should not be older than the source it covers.

use super::{is_test_file, SOURCE_EXTENSIONS};
use crate::gate::{Gate, GateContext, GateError};
use dg_core::{Finding, GateOutcome, Severity, Verdict};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Checks per-file test companionship and freshness.
pub struct TestFirstGate {
    enabled: bool,
}

impl Default for TestFirstGate {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Normalize a test file name down to the source stem it covers.
fn covered_stem(test_path: &Path) -> String {
    let mut name = stem(test_path);
    for prefix in ["test_"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest.to_string();
        }
    }
    for suffix in ["_test", "_tests", ".test", ".spec"] {
        if let Some(rest) = name.strip_suffix(suffix) {
            name = rest.to_string();
        }
    }
    name
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl Gate for TestFirstGate {
    fn gate_id(&self) -> &str {
        "test_first"
    }

    fn gate_name(&self) -> &str {
        "Test-First"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn blocking(&self) -> bool {
        false
    }

    fn run(&self, ctx: &GateContext) -> Result<GateOutcome, GateError> {
        let sources = ctx.files_with_extension(SOURCE_EXTENSIONS)?;
        if sources.is_empty() {
            return Ok(self.skip_outcome("no source files in workspace"));
        }

        let mut tests_by_stem: HashMap<String, PathBuf> = HashMap::new();
        let mut code_files = Vec::new();
        for path in sources {
            if is_test_file(&path) {
                tests_by_stem.insert(covered_stem(&path), path);
            } else {
                code_files.push(path);
            }
        }

        let mut findings = Vec::new();
        for path in &code_files {
            let source_stem = stem(path);
            // Entry points conventionally have no dedicated test file.
            if matches!(source_stem.as_str(), "main" | "lib" | "mod" | "__init__" | "index") {
                continue;
            }
            match tests_by_stem.get(&source_stem) {
                None => {
                    findings.push(
                        Finding::new(
                            self.gate_id(),
                            Severity::Warning,
                            format!("no test file covers '{source_stem}'"),
                        )
                        .at(path.clone(), 1)
                        .with_rule("article-iii-missing-test"),
                    );
                }
                Some(test_path) => {
                    if let (Some(source_time), Some(test_time)) = (mtime(path), mtime(test_path)) {
                        if source_time > test_time {
                            findings.push(
                                Finding::new(
                                    self.gate_id(),
                                    Severity::Info,
                                    format!("'{source_stem}' changed after its tests"),
                                )
                                .at(path.clone(), 1)
                                .with_rule("article-iii-stale-test"),
                            );
                        }
                    }
                }
            }
        }

        let verdict = if findings
            .iter()
            .any(|f| f.rule_id.as_deref() == Some("article-iii-missing-test"))
        {
            Verdict::Warn
        } else {
            Verdict::Pass
        };
        Ok(self.outcome(verdict, findings))
    }
}

#[cfg(test)]
#[path = "test_first_tests.rs"]
mod tests;
