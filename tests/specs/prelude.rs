//! Shared fixture for behavioral specs.

#![allow(dead_code)]

use dg_adapters::engine::EngineRegistry;
use dg_adapters::{ExecutorAdapter, FakeExecutor, ScriptedEngine};
use dg_core::{FakeClock, ProtocolRun, SequentialRunIdGen, StepRun};
use dg_engine::{Orchestrator, OrchestratorConfig, ReconciliationService};
use dg_quality::{Gate, GateContext, GateError, GateRegistry};
use dg_storage::{NewProject, NewProtocolRun, Store, StorePaths};
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Gate with a canned verdict, for driving QA outcomes.
pub struct VerdictGate {
    pub id: &'static str,
    pub verdict: dg_core::Verdict,
    pub findings: Vec<dg_core::Finding>,
}

impl VerdictGate {
    pub fn passing() -> Self {
        Self {
            id: "stub",
            verdict: dg_core::Verdict::Pass,
            findings: vec![],
        }
    }

    pub fn failing_critical() -> Self {
        Self {
            id: "stub",
            verdict: dg_core::Verdict::Fail,
            findings: vec![dg_core::Finding::new(
                "stub",
                dg_core::Severity::Critical,
                "critical finding",
            )],
        }
    }
}

impl Gate for VerdictGate {
    fn gate_id(&self) -> &str {
        self.id
    }
    fn gate_name(&self) -> &str {
        self.id
    }
    fn run(&self, _ctx: &GateContext) -> Result<dg_core::GateOutcome, GateError> {
        Ok(self.outcome(self.verdict, self.findings.clone()))
    }
}

/// A full in-memory pipeline stack over a temp-dir store.
pub struct Stack {
    pub _state_dir: TempDir,
    pub _repo: TempDir,
    pub _logs: TempDir,
    pub store: Arc<Store<FakeClock>>,
    pub engines: Arc<RwLock<EngineRegistry>>,
    pub gates: Arc<RwLock<GateRegistry>>,
    pub executor: Arc<FakeExecutor>,
    pub orchestrator: Orchestrator<FakeClock>,
}

impl Stack {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(mut config: OrchestratorConfig) -> Self {
        let state_dir = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let store = Arc::new(
            Store::open_with_clock(&StorePaths::under(state_dir.path()), FakeClock::new(1_000))
                .unwrap(),
        );
        let engines = Arc::new(RwLock::new(EngineRegistry::new()));
        let gates = Arc::new(RwLock::new(GateRegistry::new()));
        let executor = Arc::new(FakeExecutor::new());

        config.default_engine_id.get_or_insert("scripted".into());
        config.logs_dir = logs.path().to_path_buf();

        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&engines),
            Arc::clone(&gates),
            Some(Arc::clone(&executor) as Arc<dyn ExecutorAdapter>),
            config,
        )
        .with_run_id_gen(SequentialRunIdGen::new("run"));

        Self {
            _state_dir: state_dir,
            _repo: repo,
            _logs: logs,
            store,
            engines,
            gates,
            executor,
            orchestrator,
        }
    }

    pub fn reconciliation(&self) -> ReconciliationService<FakeClock> {
        ReconciliationService::new(
            Arc::clone(&self.store),
            Some(Arc::clone(&self.executor) as Arc<dyn ExecutorAdapter>),
        )
    }

    pub fn engine(&self, engine: ScriptedEngine) {
        self.engines.write().register(Arc::new(engine));
    }

    pub fn gate(&self, gate: VerdictGate) {
        self.gates.write().register(Arc::new(gate), "testing");
    }

    /// Project `p1(git_url="g")` plus a protocol seeded with `steps`
    /// execute-type steps.
    pub fn seed_protocol(&self, steps: usize) -> (ProtocolRun, Vec<StepRun>) {
        let project = self
            .store
            .create_project(NewProject {
                name: "p1".into(),
                git_url: Some("g".into()),
                local_path: Some(self._repo.path().to_path_buf()),
                ..Default::default()
            })
            .unwrap();
        let templates: Vec<serde_json::Value> = (0..steps)
            .map(|i| json!({"step_name": format!("Step {i}"), "step_type": "execute"}))
            .collect();
        let mut new = NewProtocolRun::new(project.id, "auto-proto");
        new.template_config = Some(json!({ "steps": templates }));
        self.store.create_protocol_run(new).unwrap()
    }
}
