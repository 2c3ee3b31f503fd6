//! Stuck-protocol recovery specs.

use crate::prelude::Stack;
use dg_core::{ProtocolStatus, RecoveryAction, StepStatus};
use dg_storage::StepUpdate;

#[test]
fn recovery_completes_a_running_protocol_with_finished_steps() {
    let stack = Stack::new();
    let (run, steps) = stack.seed_protocol(2);
    stack.orchestrator.start_protocol(run.id).unwrap();
    stack.orchestrator.start_protocol(run.id).unwrap();
    assert_eq!(
        stack.store.get_protocol_run(run.id).unwrap().status,
        ProtocolStatus::Running
    );

    // Both steps finished, but the protocol never settled (e.g. the
    // daemon died between the last QA write and completion).
    for step in &steps {
        stack
            .store
            .set_step_status(
                step.id,
                &[StepStatus::Pending],
                StepStatus::Completed,
                StepUpdate::default(),
            )
            .unwrap();
    }

    let outcomes = stack.orchestrator.recover_stuck_protocols().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].protocol_run_id, run.id);
    assert_eq!(outcomes[0].action, RecoveryAction::Completed);

    assert_eq!(
        stack.store.get_protocol_run(run.id).unwrap().status,
        ProtocolStatus::Completed
    );
}

#[test]
fn recovery_never_touches_empty_protocols() {
    let stack = Stack::new();
    let (run, _) = stack.seed_protocol(0);
    stack.orchestrator.start_protocol(run.id).unwrap();

    assert!(stack.orchestrator.recover_stuck_protocols().unwrap().is_empty());
    assert_eq!(
        stack.store.get_protocol_run(run.id).unwrap().status,
        ProtocolStatus::Planning
    );
}

#[test]
fn recovery_surfaces_the_next_pending_step() {
    let stack = Stack::new();
    let (run, steps) = stack.seed_protocol(3);
    stack.orchestrator.start_protocol(run.id).unwrap();
    stack.orchestrator.start_protocol(run.id).unwrap();

    stack
        .store
        .set_step_status(
            steps[0].id,
            &[StepStatus::Pending],
            StepStatus::Completed,
            StepUpdate::default(),
        )
        .unwrap();

    let outcomes = stack.orchestrator.recover_stuck_protocols().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].action, RecoveryAction::EnqueuedStep);
    assert_eq!(outcomes[0].step_run_id, Some(steps[1].id));
}
