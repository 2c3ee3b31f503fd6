// SPDX-License-Identifier: MIT

use super::*;
use dg_adapters::ScriptedEngine;
use dg_core::{FakeClock, RunId};
use dg_storage::{NewJobRun, NewProject, NewProtocolRun, StorePaths};
use serde_json::json;
use tempfile::TempDir;

struct Fixture {
    _state_dir: TempDir,
    repo: TempDir,
    logs: TempDir,
    store: Store<FakeClock>,
    run: ProtocolRun,
    step: StepRun,
    project: Project,
    job: JobRun,
}

fn fixture() -> Fixture {
    let state_dir = TempDir::new().unwrap();
    let repo = TempDir::new().unwrap();
    let logs = TempDir::new().unwrap();
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
    new.template_config = Some(json!({"steps": [{"step_name": "Implement", "step_type": "execute"}]}));
    let (run, steps) = store.create_protocol_run(new).unwrap();
    let step = steps[0].clone();
    let job = store
        .create_job_run(NewJobRun {
            run_id: RunId::new("r-1"),
            job_type: "execute_step".into(),
            project_id: Some(project.id),
            protocol_run_id: Some(run.id),
            step_run_id: Some(step.id),
            windmill_job_id: None,
            params: json!({}),
            log_path: None,
        })
        .unwrap();
    Fixture {
        _state_dir: state_dir,
        repo,
        logs,
        store,
        run,
        step,
        project,
        job,
    }
}

fn service(fixture: &Fixture, engine: ScriptedEngine) -> ExecutionService {
    let registry = Arc::new(RwLock::new(EngineRegistry::new()));
    registry.write().register(Arc::new(engine));
    ExecutionService::new(
        registry,
        fixture.logs.path().to_path_buf(),
        Some("scripted".into()),
        Duration::from_secs(5),
    )
}

#[test]
fn engine_resolution_order() {
    let fx = fixture();
    let service = service(&fx, ScriptedEngine::new("scripted"));

    // Global default applies when nothing else is set.
    assert_eq!(
        service.resolve_engine_id(None, &fx.step, &fx.project),
        "scripted"
    );

    // Project stage default beats the global default.
    let mut project = fx.project.clone();
    project.policy_overrides = Some(json!({"engine_defaults": {"code_gen": "project-engine"}}));
    assert_eq!(
        service.resolve_engine_id(None, &fx.step, &project),
        "project-engine"
    );

    // Step assignment beats the project default.
    let mut step = fx.step.clone();
    step.assigned_agent = Some("step-engine".into());
    assert_eq!(
        service.resolve_engine_id(None, &step, &project),
        "step-engine"
    );

    // Explicit argument beats everything.
    assert_eq!(
        service.resolve_engine_id(Some("explicit"), &step, &project),
        "explicit"
    );
}

#[test]
fn fallback_engine_when_nothing_configured() {
    let fx = fixture();
    let registry = Arc::new(RwLock::new(EngineRegistry::new()));
    let service = ExecutionService::new(
        registry,
        fx.logs.path().to_path_buf(),
        None,
        Duration::from_secs(5),
    );
    assert_eq!(
        service.resolve_engine_id(None, &fx.step, &fx.project),
        "opencode"
    );
}

#[tokio::test]
async fn successful_execution_captures_output_and_artifacts() {
    let fx = fixture();
    let service = service(&fx, ScriptedEngine::new("scripted").respond_with("all done"));

    let outcome = service
        .execute_step(
            &fx.store, &fx.step, &fx.run, &fx.project, &fx.job, None, None,
        )
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.stdout, "all done");
    assert!(!outcome.artifacts.is_empty());

    let log = std::fs::read_to_string(&outcome.artifacts[0].path).unwrap();
    assert!(log.contains("all done"));
    assert_eq!(fx.store.artifacts_for_step(fx.step.id).len(), 1);
}

#[tokio::test]
async fn prompt_prefers_the_step_file() {
    let fx = fixture();
    let proto_root = fx.repo.path().join(".protocols").join("proto");
    std::fs::create_dir_all(&proto_root).unwrap();
    std::fs::write(
        proto_root.join("step-0-implement.md"),
        "Implement the widget",
    )
    .unwrap();

    let engine = ScriptedEngine::new("scripted").respond_with("done");
    let service = {
        let registry = Arc::new(RwLock::new(EngineRegistry::new()));
        let engine = Arc::new(engine);
        registry.write().register(Arc::clone(&engine) as _);
        (
            ExecutionService::new(
                registry,
                fx.logs.path().to_path_buf(),
                Some("scripted".into()),
                Duration::from_secs(5),
            ),
            engine,
        )
    };

    service
        .0
        .execute_step(
            &fx.store, &fx.step, &fx.run, &fx.project, &fx.job, None, None,
        )
        .await
        .unwrap();
    let requests = service.1.requests();
    assert_eq!(requests[0].prompt, "Implement the widget");
}

#[tokio::test]
async fn template_is_prepended() {
    let fx = fixture();
    std::fs::write(fx.repo.path().join("exec-template.md"), "House rules\n").unwrap();
    let proto_root = fx.repo.path().join(".protocols").join("proto");
    std::fs::create_dir_all(&proto_root).unwrap();
    std::fs::write(proto_root.join("step-0-implement.md"), "Do the thing").unwrap();

    let mut project = fx.project.clone();
    project.policy_overrides =
        Some(json!({"prompt_templates": {"execute": "exec-template.md"}}));

    let engine = Arc::new(ScriptedEngine::new("scripted").respond_with("ok"));
    let registry = Arc::new(RwLock::new(EngineRegistry::new()));
    registry.write().register(Arc::clone(&engine) as _);
    let service = ExecutionService::new(
        registry,
        fx.logs.path().to_path_buf(),
        Some("scripted".into()),
        Duration::from_secs(5),
    );

    service
        .execute_step(&fx.store, &fx.step, &fx.run, &project, &fx.job, None, None)
        .await
        .unwrap();
    assert_eq!(
        engine.requests()[0].prompt,
        "House rules\n\nDo the thing"
    );
}

#[tokio::test]
async fn block_patterns_are_detected() {
    let fx = fixture();
    let service = service(
        &fx,
        ScriptedEngine::new("scripted")
            .respond_with("working...\nCLARIFICATION NEEDED: which database?\n"),
    );

    let outcome = service
        .execute_step(
            &fx.store, &fx.step, &fx.run, &fx.project, &fx.job, None, None,
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.blocked.as_deref(),
        Some("CLARIFICATION NEEDED: which database?")
    );
}

#[tokio::test]
async fn timeout_is_reported_in_the_outcome() {
    let fx = fixture();
    let service = service(&fx, ScriptedEngine::new("scripted").time_out());

    let outcome = service
        .execute_step(
            &fx.store, &fx.step, &fx.run, &fx.project, &fx.job, None, None,
        )
        .await
        .unwrap();
    assert!(outcome.timed_out);
    assert!(!outcome.success);
}

#[tokio::test]
async fn unavailable_engine_is_a_hard_error() {
    let fx = fixture();
    let service = service(&fx, ScriptedEngine::unavailable("scripted"));

    let err = service
        .execute_step(
            &fx.store, &fx.step, &fx.run, &fx.project, &fx.job, None, None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AgentUnavailable(_)));
}

#[tokio::test]
async fn failing_engine_carries_stderr_tail() {
    let fx = fixture();
    let service = service(
        &fx,
        ScriptedEngine::new("scripted").fail_with("stack trace\npanic: kaboom", 3),
    );

    let outcome = service
        .execute_step(
            &fx.store, &fx.step, &fx.run, &fx.project, &fx.job, None, None,
        )
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap().contains("kaboom"));
}
