// SPDX-License-Identifier: MIT

use super::*;

fn clarification() -> Clarification {
    Clarification {
        id: ClarificationId::new(1),
        scope: "step:9:execution".into(),
        project_id: ProjectId::new(1),
        protocol_run_id: Some(ProtocolRunId::new(4)),
        step_run_id: Some(StepRunId::new(9)),
        key: "blocked".into(),
        question: "Which auth provider should the step use?".into(),
        recommended: None,
        options: vec!["oauth".into(), "api-key".into()],
        applies_to: "execution".into(),
        blocking: true,
        status: ClarificationStatus::Open,
        answer: None,
        answered_by: None,
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

#[test]
fn open_clarification_satisfies_invariant() {
    let c = clarification();
    assert!(c.is_open());
    assert!(c.invariant_holds());
}

#[test]
fn answered_requires_answer_and_answerer() {
    let mut c = clarification();
    c.status = ClarificationStatus::Answered;
    assert!(!c.invariant_holds());
    c.answer = Some("oauth".into());
    assert!(!c.invariant_holds());
    c.answered_by = Some("operator".into());
    assert!(c.invariant_holds());
}

#[test]
fn serde_round_trip_preserves_equality() {
    let c = clarification();
    let json = serde_json::to_string(&c).unwrap();
    let back: Clarification = serde_json::from_str(&json).unwrap();
    assert_eq!(back, c);
}
