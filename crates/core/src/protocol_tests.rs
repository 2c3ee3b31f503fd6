// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;
use yare::parameterized;

fn step(name: &str, index: u32) -> StepRun {
    StepRun {
        id: StepRunId::new(1),
        protocol_run_id: ProtocolRunId::new(1),
        step_index: index,
        step_name: name.into(),
        step_type: "execute".into(),
        status: StepStatus::Pending,
        priority: 0,
        assigned_agent: None,
        model: None,
        summary: None,
        runtime_state: None,
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

#[parameterized(
    simple = { "Implement", 0, "step-0-implement.md" },
    spaces = { "Write API tests", 2, "step-2-write-api-tests.md" },
    punctuation = { "QA: verify + ship!", 3, "step-3-qa-verify-ship.md" },
    collapsed = { "a  --  b", 1, "step-1-a-b.md" },
)]
fn prompt_file_names(name: &str, index: u32, expected: &str) {
    assert_eq!(step(name, index).prompt_file_name(), expected);
}

#[test]
fn runtime_counters_default_to_zero() {
    let s = step("x", 0);
    assert_eq!(s.retry_count(), 0);
    assert_eq!(s.auto_fix_attempts(), 0);
}

#[test]
fn increment_preserves_other_keys() {
    let mut s = step("x", 0);
    s.runtime_state = Some(json!({"retry_count": 2, "last_engine": "opencode"}));
    let next = s.runtime_state_with_incremented("retry_count");
    assert_eq!(next["retry_count"], 3);
    assert_eq!(next["last_engine"], "opencode");

    let with_auto_fix = s.runtime_state_with_incremented("auto_fix_attempts");
    assert_eq!(with_auto_fix["auto_fix_attempts"], 1);
    assert_eq!(with_auto_fix["retry_count"], 2);
}

#[test]
fn step_templates_parse_from_config() {
    let config = json!({
        "steps": [
            {"step_name": "Plan", "step_type": "plan"},
            {"step_name": "Implement", "step_type": "execute", "priority": 5,
             "assigned_agent": "claude", "model": "sonnet"},
        ]
    });
    let templates = StepTemplate::from_template_config(&config);
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[0].step_name, "Plan");
    assert_eq!(templates[0].priority, 0);
    assert_eq!(templates[1].assigned_agent.as_deref(), Some("claude"));
}

#[test]
fn step_templates_tolerate_missing_or_malformed_steps() {
    assert!(StepTemplate::from_template_config(&json!({})).is_empty());
    let partial = json!({"steps": [{"step_name": "ok", "step_type": "plan"}, {"bogus": true}]});
    assert_eq!(StepTemplate::from_template_config(&partial).len(), 1);
}

#[test]
fn serde_round_trip_preserves_equality() {
    let mut s = step("Implement", 4);
    s.runtime_state = Some(json!({"retry_count": 1}));
    let json = serde_json::to_string(&s).unwrap();
    let back: StepRun = serde_json::from_str(&json).unwrap();
    assert_eq!(back, s);
}

mod slug_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn slugs_are_always_path_safe(name in ".{0,64}") {
            let slug = step(&name, 0).slug();
            prop_assert!(slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn slugging_is_idempotent(name in "[a-zA-Z0-9 _./]{0,48}") {
            let once = step(&name, 0).slug();
            let twice = step(&once, 0).slug();
            prop_assert_eq!(once, twice);
        }
    }
}
