//! End-to-end pipeline specs: the happy path and the failing gate.

use crate::prelude::{Stack, VerdictGate};
use dg_adapters::ScriptedEngine;
use dg_core::{EventFilter, ProtocolStatus, StepStatus, Verdict};

#[tokio::test]
async fn happy_path_drives_protocol_to_completed() {
    let stack = Stack::new();
    stack.engine(
        ScriptedEngine::new("scripted")
            .respond_with("first step output")
            .respond_with("second step output"),
    );
    stack.gate(VerdictGate::passing());

    let (run, steps) = stack.seed_protocol(2);
    assert_eq!(run.status, ProtocolStatus::Pending);

    // start: pending -> planning -> planned (steps pre-seeded)
    let run = stack.orchestrator.start_protocol(run.id).unwrap();
    assert_eq!(run.status, ProtocolStatus::Planned);
    // second start: planned -> running
    let run = stack.orchestrator.start_protocol(run.id).unwrap();
    assert_eq!(run.status, ProtocolStatus::Running);

    let first = stack
        .orchestrator
        .run_step(steps[0].id, None, None)
        .await
        .unwrap();
    assert_eq!(first.status, StepStatus::Completed);
    assert!(!stack
        .orchestrator
        .check_and_complete_protocol(run.id)
        .unwrap());

    let second = stack
        .orchestrator
        .run_step(steps[1].id, None, None)
        .await
        .unwrap();
    assert_eq!(second.status, StepStatus::Completed);

    assert!(stack
        .orchestrator
        .check_and_complete_protocol(run.id)
        .unwrap());
    assert_eq!(
        stack.store.get_protocol_run(run.id).unwrap().status,
        ProtocolStatus::Completed
    );

    // Completed steps always carry a passing QAResult.
    for step in stack.store.steps_for_protocol(run.id) {
        let results = stack.store.qa_results_for_step(step.id);
        assert_eq!(results.len(), 1);
        assert!(results[0].verdict.passed());
    }
}

#[tokio::test]
async fn failing_gate_fails_step_and_blocks_protocol() {
    let stack = Stack::new();
    stack.engine(
        ScriptedEngine::new("scripted")
            .respond_with("ok")
            .respond_with("ok"),
    );
    stack.gate(VerdictGate::passing());

    let (run, steps) = stack.seed_protocol(2);
    stack.orchestrator.start_protocol(run.id).unwrap();
    stack.orchestrator.start_protocol(run.id).unwrap();

    stack
        .orchestrator
        .run_step(steps[0].id, None, None)
        .await
        .unwrap();

    // Second step's QA returns fail with one critical finding.
    stack.gate(VerdictGate::failing_critical());
    let second = stack
        .orchestrator
        .run_step(steps[1].id, None, None)
        .await
        .unwrap();
    assert_eq!(second.status, StepStatus::Failed);
    assert_eq!(
        stack.store.get_protocol_run(run.id).unwrap().status,
        ProtocolStatus::Blocked
    );

    let results = stack.store.qa_results_for_step(second.id);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].verdict, Verdict::Fail);
    assert_eq!(results[0].findings.len(), 1);

    // qa_evaluated events were recorded for both evaluations.
    let qa_events = stack
        .store
        .events_after(
            0,
            &EventFilter {
                event_type: Some("qa_evaluated".into()),
                ..Default::default()
            },
            0,
        )
        .unwrap();
    assert_eq!(qa_events.len(), 2);
}

#[tokio::test]
async fn event_ids_are_monotonic_across_the_whole_flow() {
    let stack = Stack::new();
    stack.engine(ScriptedEngine::new("scripted").respond_with("ok"));
    stack.gate(VerdictGate::passing());

    let (run, steps) = stack.seed_protocol(1);
    stack.orchestrator.start_protocol(run.id).unwrap();
    stack.orchestrator.start_protocol(run.id).unwrap();
    stack
        .orchestrator
        .run_step(steps[0].id, None, None)
        .await
        .unwrap();
    stack
        .orchestrator
        .check_and_complete_protocol(run.id)
        .unwrap();

    let records = stack
        .store
        .events_after(0, &EventFilter::default(), 0)
        .unwrap();
    assert!(records.len() > 5);
    for pair in records.windows(2) {
        assert!(pair[0].id < pair[1].id, "event ids must strictly increase");
    }
    stack.store.check_invariants().unwrap();
}
