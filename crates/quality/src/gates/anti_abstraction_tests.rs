// SPDX-License-Identifier: MIT

use super::*;
use tempfile::TempDir;

fn run_on(content: &str) -> GateOutcome {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("m.py"), content).unwrap();
    AntiAbstractionGate::default()
        .run(&GateContext::new(dir.path()))
        .unwrap()
}

#[test]
fn plain_classes_pass() {
    let outcome = run_on("class Order:\n    pass\n");
    assert_eq!(outcome.verdict, Verdict::Pass);
}

#[test]
fn wrapper_class_is_flagged() {
    let outcome = run_on("class DatabaseWrapper:\n    pass\n");
    assert_eq!(outcome.verdict, Verdict::Warn);
    assert_eq!(
        outcome.findings[0].rule_id.as_deref(),
        Some("article-ix-anti-abstraction")
    );
}

#[test]
fn single_implementation_abstract_base_is_flagged() {
    let outcome = run_on(
        "from abc import ABC\n\nclass Storage(ABC):\n    pass\n\nclass DiskStorage(Storage):\n    pass\n",
    );
    assert_eq!(outcome.verdict, Verdict::Warn);
    assert!(outcome
        .findings
        .iter()
        .any(|f| f.rule_id.as_deref() == Some("article-ix-single-implementation")));
}

#[test]
fn abstract_base_with_two_implementations_passes() {
    let outcome = run_on(
        "from abc import ABC\n\nclass Storage(ABC):\n    pass\n\nclass DiskStorage(Storage):\n    pass\n\nclass MemoryStorage(Storage):\n    pass\n",
    );
    assert_eq!(outcome.verdict, Verdict::Pass);
}
