// SPDX-License-Identifier: MIT

use super::*;
use tempfile::TempDir;

fn run_on(content: &str, name: &str) -> GateOutcome {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(name), content).unwrap();
    TypeGate::default()
        .run(&GateContext::new(dir.path()))
        .unwrap()
}

#[test]
fn annotated_python_passes() {
    let outcome = run_on("def add(a: int, b: int) -> int:\n    return a + b\n", "m.py");
    assert_eq!(outcome.verdict, Verdict::Pass);
}

#[test]
fn bare_python_signature_warns() {
    let outcome = run_on("def add(a, b):\n    return a + b\n", "m.py");
    assert_eq!(outcome.verdict, Verdict::Warn);
    assert_eq!(
        outcome.findings[0].rule_id.as_deref(),
        Some("missing-annotation")
    );
}

#[test]
fn private_helpers_are_ignored() {
    let outcome = run_on("def _helper(x):\n    return x\n", "m.py");
    assert_eq!(outcome.verdict, Verdict::Pass);
}

#[test]
fn missing_return_annotation_warns() {
    let outcome = run_on("def add(a: int, b: int):\n    return a + b\n", "m.py");
    assert_eq!(outcome.verdict, Verdict::Warn);
}

#[test]
fn explicit_any_warns_in_typescript() {
    let outcome = run_on("function f(x: any): void {}\n", "m.ts");
    assert_eq!(outcome.verdict, Verdict::Warn);
    assert_eq!(outcome.findings[0].rule_id.as_deref(), Some("explicit-any"));
}

#[test]
fn no_typed_sources_skips() {
    let outcome = run_on("fn main() {}\n", "main.rs");
    assert_eq!(outcome.verdict, Verdict::Skip);
}
