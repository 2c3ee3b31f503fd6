// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

fn project() -> Project {
    Project {
        id: ProjectId::new(1),
        name: "demo".into(),
        git_url: Some("https://example.com/demo.git".into()),
        base_branch: "main".into(),
        local_path: Some(PathBuf::from("/tmp/demo")),
        status: ProjectStatus::Active,
        constitution_hash: None,
        policy_overrides: None,
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

#[test]
fn archive_round_trip() {
    let mut p = project();
    assert_eq!(p.archive().unwrap(), ProjectStatus::Archived);
    p.status = ProjectStatus::Archived;
    assert!(p.archive().is_err());
    assert_eq!(p.unarchive().unwrap(), ProjectStatus::Active);
}

#[test]
fn unarchive_active_is_rejected() {
    let p = project();
    assert!(p.unarchive().is_err());
}

#[test]
fn engine_default_reads_policy_overrides() {
    let mut p = project();
    assert_eq!(p.engine_default_for("code_gen"), None);

    p.policy_overrides = Some(json!({
        "engine_defaults": {"code_gen": "claude", "qa": "opencode"},
        "qa_max_auto_fix_attempts": 2,
    }));
    assert_eq!(p.engine_default_for("code_gen").as_deref(), Some("claude"));
    assert_eq!(p.engine_default_for("pr"), None);
    assert_eq!(p.qa_max_auto_fix_attempts(), Some(2));
}

#[test]
fn serde_round_trip_preserves_equality() {
    let p = project();
    let json = serde_json::to_string(&p).unwrap();
    let back: Project = serde_json::from_str(&json).unwrap();
    assert_eq!(back, p);
}
