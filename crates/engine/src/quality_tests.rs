// SPDX-License-Identifier: MIT

use super::*;
use dg_core::{FakeClock, GateOutcome, Severity};
use dg_quality::{Gate, GateError};
use dg_storage::{NewProject, NewProtocolRun, StorePaths};
use serde_json::json;
use tempfile::TempDir;

struct FixedGate {
    id: &'static str,
    verdict: Verdict,
    findings: Vec<Finding>,
}

impl Gate for FixedGate {
    fn gate_id(&self) -> &str {
        self.id
    }
    fn gate_name(&self) -> &str {
        self.id
    }
    fn run(&self, _ctx: &GateContext) -> Result<GateOutcome, GateError> {
        Ok(GateOutcome {
            gate_id: self.id.into(),
            gate_name: self.id.into(),
            verdict: self.verdict,
            findings: self.findings.clone(),
            metadata: None,
            duration_ms: 1,
            error: None,
        })
    }
}

struct Fixture {
    _state_dir: TempDir,
    _repo: TempDir,
    store: Store<FakeClock>,
    run: ProtocolRun,
    step: StepRun,
    project: Project,
}

fn fixture(policy: Option<serde_json::Value>) -> Fixture {
    let state_dir = TempDir::new().unwrap();
    let repo = TempDir::new().unwrap();
    let store =
        Store::open_with_clock(&StorePaths::under(state_dir.path()), FakeClock::new(1_000))
            .unwrap();
    let project = store
        .create_project(NewProject {
            name: "demo".into(),
            local_path: Some(repo.path().to_path_buf()),
            policy_overrides: policy,
            ..Default::default()
        })
        .unwrap();
    let mut new = NewProtocolRun::new(project.id, "proto");
    new.template_config =
        Some(json!({"steps": [{"step_name": "Implement", "step_type": "execute"}]}));
    let (run, steps) = store.create_protocol_run(new).unwrap();
    // Step sits where QA picks it up.
    let step = store
        .set_step_status(
            steps[0].id,
            &[StepStatus::Pending],
            StepStatus::Running,
            StepUpdate::default(),
        )
        .unwrap();
    let step = store
        .set_step_status(
            step.id,
            &[StepStatus::Running],
            StepStatus::NeedsQa,
            StepUpdate::default(),
        )
        .unwrap();
    Fixture {
        _state_dir: state_dir,
        _repo: repo,
        store,
        run,
        step,
        project,
    }
}

fn service_with(gates: Vec<FixedGate>, max_auto_fix: u32) -> QualityService {
    let mut registry = GateRegistry::new();
    for gate in gates {
        registry.register(Arc::new(gate), "testing");
    }
    QualityService::new(Arc::new(RwLock::new(registry)), false, max_auto_fix)
}

#[test]
fn pass_completes_the_step() {
    let fx = fixture(None);
    let service = service_with(
        vec![FixedGate {
            id: "ok",
            verdict: Verdict::Pass,
            findings: vec![],
        }],
        0,
    );

    let result = service
        .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
        .unwrap();
    assert_eq!(result.verdict, Verdict::Pass);

    let step = fx.store.get_step_run(fx.step.id).unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert_eq!(step.summary.as_deref(), Some("QA passed"));
    assert_eq!(
        fx.store.get_protocol_run(fx.run.id).unwrap().status,
        ProtocolStatus::Pending
    );
    // Exactly one QAResult per evaluation.
    assert_eq!(fx.store.qa_results_for_step(fx.step.id).len(), 1);
}

#[test]
fn warn_and_skip_also_complete() {
    for verdict in [Verdict::Warn, Verdict::Skip] {
        let fx = fixture(None);
        let service = service_with(
            vec![FixedGate {
                id: "g",
                verdict,
                findings: vec![],
            }],
            0,
        );
        service
            .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
            .unwrap();
        assert_eq!(
            fx.store.get_step_run(fx.step.id).unwrap().status,
            StepStatus::Completed
        );
    }
}

#[test]
fn empty_registry_is_skip_and_completes() {
    let fx = fixture(None);
    let service = service_with(vec![], 0);
    let result = service
        .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
        .unwrap();
    assert_eq!(result.verdict, Verdict::Skip);
    assert_eq!(
        fx.store.get_step_run(fx.step.id).unwrap().status,
        StepStatus::Completed
    );
}

#[test]
fn fail_fails_step_and_blocks_protocol() {
    let fx = fixture(None);
    let service = service_with(
        vec![FixedGate {
            id: "test",
            verdict: Verdict::Fail,
            findings: vec![Finding::new("test", Severity::Critical, "no tests")],
        }],
        0,
    );

    let result = service
        .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
        .unwrap();
    assert_eq!(result.verdict, Verdict::Fail);
    assert_eq!(result.findings.len(), 1);

    assert_eq!(
        fx.store.get_step_run(fx.step.id).unwrap().status,
        StepStatus::Failed
    );
    assert_eq!(
        fx.store.get_protocol_run(fx.run.id).unwrap().status,
        ProtocolStatus::Blocked
    );
}

#[test]
fn gate_error_aggregates_to_fail() {
    let fx = fixture(None);
    let service = service_with(
        vec![
            FixedGate {
                id: "a",
                verdict: Verdict::Pass,
                findings: vec![],
            },
            FixedGate {
                id: "b",
                verdict: Verdict::Error,
                findings: vec![],
            },
        ],
        0,
    );
    let result = service
        .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
        .unwrap();
    assert_eq!(result.verdict, Verdict::Fail);
    assert_eq!(result.gate_results.len(), 2);
}

#[test]
fn auto_fix_loop_keeps_step_running_within_budget() {
    let fx = fixture(None);
    let service = service_with(
        vec![FixedGate {
            id: "lint",
            verdict: Verdict::Fail,
            findings: vec![
                Finding::new("lint", Severity::Error, "debug statement")
                    .with_rule("debug-statement"),
            ],
        }],
        2,
    );

    service
        .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
        .unwrap();
    let step = fx.store.get_step_run(fx.step.id).unwrap();
    assert_eq!(step.status, StepStatus::Running);
    assert_eq!(step.auto_fix_attempts(), 1);
    // Protocol untouched while the loop runs.
    assert_eq!(
        fx.store.get_protocol_run(fx.run.id).unwrap().status,
        ProtocolStatus::Pending
    );

    // Budget exhausted: second failure on the re-queued step fails it.
    let step = fx
        .store
        .set_step_status(
            step.id,
            &[StepStatus::Running],
            StepStatus::NeedsQa,
            StepUpdate::default(),
        )
        .unwrap();
    service
        .evaluate_step(&fx.store, &step, &fx.run, &fx.project)
        .unwrap();
    let step = fx.store.get_step_run(step.id).unwrap();
    assert_eq!(step.status, StepStatus::Running);
    assert_eq!(step.auto_fix_attempts(), 2);

    let step = fx
        .store
        .set_step_status(
            step.id,
            &[StepStatus::Running],
            StepStatus::NeedsQa,
            StepUpdate::default(),
        )
        .unwrap();
    service
        .evaluate_step(&fx.store, &step, &fx.run, &fx.project)
        .unwrap();
    assert_eq!(
        fx.store.get_step_run(step.id).unwrap().status,
        StepStatus::Failed
    );
}

#[test]
fn non_fixable_findings_bypass_the_loop() {
    let fx = fixture(None);
    let service = service_with(
        vec![FixedGate {
            id: "security",
            verdict: Verdict::Fail,
            findings: vec![Finding::new("security", Severity::Critical, "secret")
                .with_rule("hardcoded-secret")],
        }],
        3,
    );
    service
        .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
        .unwrap();
    assert_eq!(
        fx.store.get_step_run(fx.step.id).unwrap().status,
        StepStatus::Failed
    );
}

#[test]
fn project_policy_selects_gates_and_budget() {
    let fx = fixture(Some(json!({
        "gates": ["only"],
        "qa_max_auto_fix_attempts": 1,
    })));
    let service = service_with(
        vec![
            FixedGate {
                id: "only",
                verdict: Verdict::Pass,
                findings: vec![],
            },
            FixedGate {
                id: "ignored",
                verdict: Verdict::Fail,
                findings: vec![],
            },
        ],
        0,
    );

    let result = service
        .evaluate_step(&fx.store, &fx.step, &fx.run, &fx.project)
        .unwrap();
    // The failing gate was not selected, so the verdict is pass.
    assert_eq!(result.verdict, Verdict::Pass);
    assert_eq!(result.gate_results.len(), 1);
}

#[test]
fn direct_complete_mode_advances_running_steps() {
    let state_dir = TempDir::new().unwrap();
    let repo = TempDir::new().unwrap();
    let store =
        Store::open_with_clock(&StorePaths::under(state_dir.path()), FakeClock::new(1_000))
            .unwrap();
    let project = store
        .create_project(NewProject {
            name: "demo".into(),
            local_path: Some(repo.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
    let mut new = NewProtocolRun::new(project.id, "proto");
    new.template_config =
        Some(json!({"steps": [{"step_name": "Implement", "step_type": "execute"}]}));
    let (run, steps) = store.create_protocol_run(new).unwrap();
    let step = store
        .set_step_status(
            steps[0].id,
            &[StepStatus::Pending],
            StepStatus::Running,
            StepUpdate::default(),
        )
        .unwrap();

    let mut registry = GateRegistry::new();
    registry.register(
        Arc::new(FixedGate {
            id: "ok",
            verdict: Verdict::Pass,
            findings: vec![],
        }),
        "testing",
    );
    let service = QualityService::new(Arc::new(RwLock::new(registry)), true, 0);

    service.evaluate_step(&store, &step, &run, &project).unwrap();
    assert_eq!(
        store.get_step_run(step.id).unwrap().status,
        StepStatus::Completed
    );
}
