// SPDX-License-Identifier: MIT

use super::*;
use tempfile::TempDir;

fn touch(dir: &TempDir, rel: &str) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, "x").unwrap();
}

#[test]
fn walk_skips_excluded_dirs() {
    let dir = TempDir::new().unwrap();
    touch(&dir, "src/main.rs");
    touch(&dir, "node_modules/pkg/index.js");
    touch(&dir, "target/debug/junk");
    touch(&dir, ".git/config");
    touch(&dir, "tests/api_test.rs");

    let ctx = GateContext::new(dir.path());
    let files = ctx.walk_files().unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| {
            p.strip_prefix(dir.path())
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(names, vec!["src/main.rs", "tests/api_test.rs"]);
}

#[test]
fn walk_on_missing_root_is_empty() {
    let ctx = GateContext::new("/definitely/not/a/path");
    assert!(ctx.walk_files().unwrap().is_empty());
}

#[test]
fn files_with_extension_filters() {
    let dir = TempDir::new().unwrap();
    touch(&dir, "a.py");
    touch(&dir, "b.rs");
    touch(&dir, "c.txt");

    let ctx = GateContext::new(dir.path());
    let py = ctx.files_with_extension(&["py"]).unwrap();
    assert_eq!(py.len(), 1);
    let both = ctx.files_with_extension(&["py", "rs"]).unwrap();
    assert_eq!(both.len(), 2);
}

struct NullGate;

impl Gate for NullGate {
    fn gate_id(&self) -> &str {
        "null"
    }
    fn gate_name(&self) -> &str {
        "Null Gate"
    }
    fn run(&self, _ctx: &GateContext) -> Result<dg_core::GateOutcome, GateError> {
        Ok(self.outcome(dg_core::Verdict::Pass, vec![]))
    }
}

#[test]
fn outcome_helpers_carry_gate_identity() {
    let gate = NullGate;
    let skip = gate.skip_outcome("disabled");
    assert_eq!(skip.gate_id, "null");
    assert_eq!(skip.verdict, dg_core::Verdict::Skip);

    let error = gate.error_outcome("boom");
    assert_eq!(error.verdict, dg_core::Verdict::Error);
    assert_eq!(error.error.as_deref(), Some("boom"));
}
