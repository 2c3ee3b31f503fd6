//! Reconciliation specs: auto-fix and manual-required drift.

use crate::prelude::Stack;
use dg_adapters::{ExecutorAdapter, ExternalJobStatus};
use dg_core::{EventFilter, RunId, StepStatus};
use dg_engine::ReconciliationAction;
use dg_storage::{NewJobRun, StepUpdate};
use serde_json::json;

/// Step in the DB as `running` with an external job "J1".
fn wedge_running_step(stack: &Stack) -> dg_core::StepRun {
    let (run, steps) = stack.seed_protocol(1);
    let step = stack
        .store
        .set_step_status(
            steps[0].id,
            &[StepStatus::Pending],
            StepStatus::Running,
            StepUpdate::default(),
        )
        .unwrap();
    stack
        .store
        .create_job_run(NewJobRun {
            run_id: RunId::new("r-1"),
            job_type: "execute_step".into(),
            project_id: Some(run.project_id),
            protocol_run_id: Some(run.id),
            step_run_id: Some(step.id),
            windmill_job_id: Some("J1".into()),
            params: json!({}),
            log_path: None,
        })
        .unwrap();
    step
}

#[tokio::test]
async fn auto_fix_converges_running_step_to_completed() {
    let stack = Stack::new();
    let step = wedge_running_step(&stack);
    stack.executor.insert_job("J1", ExternalJobStatus::Completed);

    let report = stack
        .reconciliation()
        .reconcile_runs(None, false)
        .await
        .unwrap();
    assert_eq!(report.total_checked, 1);
    assert_eq!(report.details.len(), 1);
    assert_eq!(report.details[0].action, ReconciliationAction::AutoFixed);
    assert_eq!(report.details[0].windmill_job_id.as_deref(), Some("J1"));

    assert_eq!(
        stack.store.get_step_run(step.id).unwrap().status,
        StepStatus::Completed
    );

    // reconciliation_auto_fix logged with previous/new and the job id.
    let events = stack
        .store
        .events_after(
            0,
            &EventFilter {
                event_type: Some("reconciliation_auto_fix".into()),
                ..Default::default()
            },
            0,
        )
        .unwrap();
    assert_eq!(events.len(), 1);
    match &events[0].event {
        dg_core::Event::ReconciliationAutoFix {
            previous,
            new,
            windmill_job_id,
            ..
        } => {
            assert_eq!(*previous, StepStatus::Running);
            assert_eq!(*new, StepStatus::Completed);
            assert_eq!(windmill_job_id, "J1");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn terminal_db_state_is_never_overruled() {
    let stack = Stack::new();
    let step = wedge_running_step(&stack);
    // Drive the DB to completed, then have the executor claim failure.
    stack
        .store
        .set_step_status(
            step.id,
            &[StepStatus::Running],
            StepStatus::NeedsQa,
            StepUpdate::default(),
        )
        .unwrap();
    stack
        .store
        .set_step_status(
            step.id,
            &[StepStatus::NeedsQa],
            StepStatus::Completed,
            StepUpdate::default(),
        )
        .unwrap();
    stack.executor.insert_job("J1", ExternalJobStatus::Failed);

    let detail = stack
        .reconciliation()
        .reconcile_single_step(step.id, false)
        .await
        .unwrap();
    assert_eq!(detail.action, ReconciliationAction::ManualRequired);

    // No state change.
    assert_eq!(
        stack.store.get_step_run(step.id).unwrap().status,
        StepStatus::Completed
    );
}

#[tokio::test]
async fn post_reconcile_active_steps_agree_with_executor() {
    let stack = Stack::new();
    let step = wedge_running_step(&stack);
    stack.executor.insert_job("J1", ExternalJobStatus::Running);

    stack
        .reconciliation()
        .reconcile_runs(None, false)
        .await
        .unwrap();

    // For every active step with a known external job, the mapped
    // status equals the step status.
    let job = stack.store.latest_job_for_step(step.id).unwrap();
    let external = stack
        .executor
        .get_job(job.windmill_job_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(
        dg_engine::map_external_status(external.status),
        stack.store.get_step_run(step.id).unwrap().status
    );
}
