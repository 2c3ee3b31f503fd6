// SPDX-License-Identifier: MIT

use super::*;
use dg_core::FakeClock;
use serde_json::json;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> Store<FakeClock> {
    let paths = StorePaths::under(dir.path());
    Store::open_with_clock(&paths, FakeClock::new(1_000)).unwrap()
}

fn seeded_protocol(store: &Store<FakeClock>) -> (ProtocolRun, Vec<StepRun>) {
    let project = store
        .create_project(NewProject {
            name: "demo".into(),
            git_url: Some("https://example.com/demo.git".into()),
            ..Default::default()
        })
        .unwrap();
    let mut new = NewProtocolRun::new(project.id, "auto-proto");
    new.template_config = Some(json!({
        "steps": [
            {"step_name": "Implement", "step_type": "execute"},
            {"step_name": "Verify", "step_type": "qa"},
        ]
    }));
    store.create_protocol_run(new).unwrap()
}

#[test]
fn create_project_assigns_sequential_ids() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let a = store
        .create_project(NewProject {
            name: "a".into(),
            ..Default::default()
        })
        .unwrap();
    let b = store
        .create_project(NewProject {
            name: "b".into(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(a.id.value(), 1);
    assert_eq!(b.id.value(), 2);
    assert_eq!(a.base_branch, "main");
}

#[test]
fn empty_project_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let err = store
        .create_project(NewProject {
            name: "  ".into(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn protocol_seeds_steps_from_template() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, steps) = seeded_protocol(&store);
    assert_eq!(run.status, ProtocolStatus::Pending);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].step_index, 0);
    assert_eq!(steps[1].step_index, 1);
    assert_eq!(steps[1].step_type, "qa");
    store.check_invariants().unwrap();
}

#[test]
fn illegal_transition_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, _) = seeded_protocol(&store);

    let before = store.last_event_id();
    let err = store
        .apply_protocol_op(run.id, ProtocolOp::Pause, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)));
    assert_eq!(store.last_event_id(), before);
    assert_eq!(
        store.get_protocol_run(run.id).unwrap().status,
        ProtocolStatus::Pending
    );
}

#[test]
fn protocol_op_emits_exactly_one_event() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, _) = seeded_protocol(&store);

    let before = store.last_event_id();
    let (updated, changed) = store
        .apply_protocol_op(run.id, ProtocolOp::Start, None)
        .unwrap();
    assert!(changed);
    assert_eq!(updated.status, ProtocolStatus::Planning);
    assert_eq!(store.last_event_id(), before + 1);
}

#[test]
fn cancel_on_settled_is_no_op_without_event() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, _) = seeded_protocol(&store);
    store
        .apply_protocol_op(run.id, ProtocolOp::Cancel, None)
        .unwrap();

    let before = store.last_event_id();
    let (updated, changed) = store
        .apply_protocol_op(run.id, ProtocolOp::Cancel, None)
        .unwrap();
    assert!(!changed);
    assert_eq!(updated.status, ProtocolStatus::Cancelled);
    assert_eq!(store.last_event_id(), before);
}

#[test]
fn guarded_step_transition() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (_, steps) = seeded_protocol(&store);
    let step = &steps[0];

    let updated = store
        .set_step_status(
            step.id,
            &[StepStatus::Pending, StepStatus::Failed, StepStatus::Blocked],
            StepStatus::Running,
            StepUpdate::default(),
        )
        .unwrap();
    assert_eq!(updated.status, StepStatus::Running);

    // Running is not in the expected set: second run attempt fails.
    let err = store
        .set_step_status(
            step.id,
            &[StepStatus::Pending, StepStatus::Failed, StepStatus::Blocked],
            StepStatus::Running,
            StepUpdate::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition(_)));
}

#[test]
fn step_update_can_carry_runtime_state() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (_, steps) = seeded_protocol(&store);

    let updated = store
        .set_step_status(
            steps[0].id,
            &[StepStatus::Pending],
            StepStatus::Running,
            StepUpdate {
                runtime_state: Some(json!({"retry_count": 1})),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.retry_count(), 1);
}

#[test]
fn job_run_lifecycle_and_webhook_idempotence() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, steps) = seeded_protocol(&store);

    let job = store
        .create_job_run(NewJobRun {
            run_id: RunId::new("r-1"),
            job_type: "execute_step".into(),
            project_id: Some(run.project_id),
            protocol_run_id: Some(run.id),
            step_run_id: Some(steps[0].id),
            windmill_job_id: None,
            params: json!({}),
            log_path: None,
        })
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let (_, changed) = store
        .set_job_status(
            &job.run_id,
            JobStatus::Running,
            JobUpdate {
                windmill_job_id: Some("J1".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(changed);

    // Re-delivering the same status emits no event.
    let before = store.last_event_id();
    let (_, changed) = store
        .set_job_status(&job.run_id, JobStatus::Running, JobUpdate::default())
        .unwrap();
    assert!(!changed);
    assert_eq!(store.last_event_id(), before);

    assert!(store.job_by_windmill_id("J1").is_some());
    assert_eq!(
        store.latest_job_for_step(steps[0].id).unwrap().run_id,
        job.run_id
    );
}

#[test]
fn windmill_id_uniqueness_is_enforced() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, steps) = seeded_protocol(&store);

    for (run_id, wid) in [("r-1", Some("J1")), ("r-2", None)] {
        store
            .create_job_run(NewJobRun {
                run_id: RunId::new(run_id),
                job_type: "execute_step".into(),
                project_id: Some(run.project_id),
                protocol_run_id: Some(run.id),
                step_run_id: Some(steps[0].id),
                windmill_job_id: wid.map(String::from),
                params: json!({}),
                log_path: None,
            })
            .unwrap();
    }

    let err = store
        .set_job_status(
            &RunId::new("r-2"),
            JobStatus::Queued,
            JobUpdate {
                windmill_job_id: Some("J1".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn clarification_upsert_is_unique_by_scope_key() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, steps) = seeded_protocol(&store);

    let new = |question: &str| NewClarification {
        scope: format!("step:{}:execution", steps[0].id),
        project_id: run.project_id,
        protocol_run_id: Some(run.id),
        step_run_id: Some(steps[0].id),
        key: "blocked".into(),
        question: question.into(),
        recommended: None,
        options: vec![],
        applies_to: "execution".into(),
        blocking: true,
    };

    let first = store.upsert_clarification(new("original?")).unwrap();
    let second = store.upsert_clarification(new("updated?")).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.question, "updated?");
    assert_eq!(store.list_clarifications(None, None).len(), 1);
}

#[test]
fn answered_clarification_satisfies_invariant() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, steps) = seeded_protocol(&store);
    let clarification = store
        .upsert_clarification(NewClarification {
            scope: format!("step:{}:execution", steps[0].id),
            project_id: run.project_id,
            protocol_run_id: Some(run.id),
            step_run_id: Some(steps[0].id),
            key: "blocked".into(),
            question: "?".into(),
            recommended: None,
            options: vec![],
            applies_to: "execution".into(),
            blocking: true,
        })
        .unwrap();

    let answered = store
        .answer_clarification(clarification.id, "use oauth".into(), "operator".into())
        .unwrap();
    assert_eq!(answered.status, ClarificationStatus::Answered);
    assert_eq!(answered.answer.as_deref(), Some("use oauth"));

    // Answering twice is rejected.
    assert!(store
        .answer_clarification(clarification.id, "again".into(), "operator".into())
        .is_err());
    store.check_invariants().unwrap();
}

#[test]
fn event_ids_are_strictly_monotonic_across_entities() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    seeded_protocol(&store);
    let records = store
        .events_after(0, &EventFilter::default(), 0)
        .unwrap();
    let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(ids, sorted);
    assert_eq!(ids.first(), Some(&1));
}

#[test]
fn recent_events_is_newest_first_and_capped() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    seeded_protocol(&store);
    let recent = store.recent_events(&EventFilter::default(), 2).unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].id > recent[1].id);
}

#[test]
fn reopen_recovers_state_via_snapshot_and_replay() {
    let dir = TempDir::new().unwrap();
    let paths = StorePaths::under(dir.path());
    let run_id;
    {
        let store = Store::open_with_clock(&paths, FakeClock::new(1_000)).unwrap();
        let (run, steps) = seeded_protocol(&store);
        run_id = run.id;
        store
            .apply_protocol_op(run.id, ProtocolOp::Start, None)
            .unwrap();
        // Snapshot mid-history, then keep writing.
        store.checkpoint_now().unwrap();
        store
            .set_step_status(
                steps[0].id,
                &[StepStatus::Pending],
                StepStatus::Running,
                StepUpdate::default(),
            )
            .unwrap();
        store.flush().unwrap();
    }

    let store = Store::open_with_clock(&paths, FakeClock::new(2_000)).unwrap();
    let run = store.get_protocol_run(run_id).unwrap();
    assert_eq!(run.status, ProtocolStatus::Planning);
    let steps = store.steps_for_protocol(run_id);
    assert_eq!(steps[0].status, StepStatus::Running);
    // Ids continue after the recovered history.
    let (run2, _) = seeded_protocol(&store);
    assert!(run2.id > run_id);
    store.check_invariants().unwrap();
}

#[test]
fn delete_project_cascades() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, steps) = seeded_protocol(&store);
    store
        .create_job_run(NewJobRun {
            run_id: RunId::new("r-1"),
            job_type: "execute_step".into(),
            project_id: Some(run.project_id),
            protocol_run_id: Some(run.id),
            step_run_id: Some(steps[0].id),
            windmill_job_id: None,
            params: json!({}),
            log_path: None,
        })
        .unwrap();

    store.delete_project(run.project_id).unwrap();
    assert!(store.get_protocol_run(run.id).is_err());
    assert!(store.get_step_run(steps[0].id).is_err());
    assert!(store.get_job_run("r-1").is_err());
    store.check_invariants().unwrap();
}

#[test]
fn reconciliation_auto_fix_guard() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (_, steps) = seeded_protocol(&store);
    let step = store.get_step_run(steps[0].id).unwrap();

    let fixed = store
        .record_reconciliation_auto_fix(
            &step,
            StepStatus::Pending,
            StepStatus::Running,
            "J1".into(),
        )
        .unwrap();
    assert_eq!(fixed.status, StepStatus::Running);

    // Stale observation: the guard rejects.
    assert!(store
        .record_reconciliation_auto_fix(
            &step,
            StepStatus::Pending,
            StepStatus::Completed,
            "J1".into(),
        )
        .is_err());
}

#[test]
fn spec_run_lifecycle_and_listing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (run, _) = seeded_protocol(&store);

    let spec = store
        .create_spec_run(NewSpecRun {
            project_id: run.project_id,
            spec_name: "payments".into(),
            spec_root: None,
            spec_path: None,
            branch_name: Some("spec/payments".into()),
            base_branch: Some("main".into()),
        })
        .unwrap();
    assert_eq!(spec.status, SpecRunStatus::Specifying);

    let updated = store
        .set_spec_run_status(spec.id, SpecRunStatus::Specified)
        .unwrap();
    assert_eq!(updated.status, SpecRunStatus::Specified);

    // Same-status set is a no-op without an event.
    let before = store.last_event_id();
    store
        .set_spec_run_status(spec.id, SpecRunStatus::Specified)
        .unwrap();
    assert_eq!(store.last_event_id(), before);

    assert_eq!(store.list_spec_runs(Some(run.project_id)).len(), 1);
    assert_eq!(store.list_spec_runs(None).len(), 1);
    assert!(store.get_spec_run(spec.id).is_ok());
}

#[test]
fn watch_channel_tracks_last_event_id() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let rx = store.watch_last_event_id();
    seeded_protocol(&store);
    assert_eq!(*rx.borrow(), store.last_event_id());
}
