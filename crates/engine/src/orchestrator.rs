// SPDX-License-Identifier: MIT

//! The protocol/step orchestrator.
//!
//! Owns transition legality, dispatch to the local engine or the
//! external executor, completion, and recovery of stuck runs. Every
//! transition goes through a guarded store commit; illegal operations
//! reject without touching state.

use crate::error::OrchestratorError;
use crate::execution::ExecutionService;
use crate::quality::QualityService;
use dg_adapters::engine::EngineRegistry;
use dg_adapters::ExecutorAdapter;
use dg_core::{
    Clock, DispatchMode, Project, ProtocolOp, ProtocolRun, ProtocolRunId, ProtocolStatus,
    QaResult, RecoveryAction, RunId, RunIdGen, StepRun, StepRunId, StepStatus, SystemClock,
    UuidRunIdGen,
};
use dg_quality::GateRegistry;
use dg_storage::{JobUpdate, NewClarification, NewJobRun, NewProtocolRun, StepUpdate, Store};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// `RunStep` is valid from these statuses.
const RUN_FROM: &[StepStatus] = &[StepStatus::Pending, StepStatus::Failed, StepStatus::Blocked];

/// `RetryStep` is valid from these statuses.
const RETRY_FROM: &[StepStatus] = &[StepStatus::Failed, StepStatus::Timeout, StepStatus::Blocked];

/// Non-terminal protocol statuses (guards for internal moves).
const PROTOCOL_OPEN: &[ProtocolStatus] = &[
    ProtocolStatus::Pending,
    ProtocolStatus::Planning,
    ProtocolStatus::Planned,
    ProtocolStatus::Running,
    ProtocolStatus::Paused,
    ProtocolStatus::Blocked,
    ProtocolStatus::NeedsQa,
];

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub dispatch_mode: DispatchMode,
    pub default_engine_id: Option<String>,
    /// Executor script submitted for EXTERNAL dispatch.
    pub windmill_script_path: String,
    pub engine_timeout: Duration,
    /// Legacy `running -> completed` shortcut (configuration choice).
    pub qa_direct_complete: bool,
    pub qa_max_auto_fix_attempts: u32,
    pub logs_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_mode: DispatchMode::Local,
            default_engine_id: None,
            windmill_script_path: "f/devgodzilla/execute_step".into(),
            engine_timeout: Duration::from_secs(900),
            qa_direct_complete: false,
            qa_max_auto_fix_attempts: 0,
            logs_dir: PathBuf::from("logs"),
        }
    }
}

/// One action taken by stuck-run recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub protocol_run_id: ProtocolRunId,
    pub action: RecoveryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_run_id: Option<StepRunId>,
}

struct Inner<C: Clock> {
    store: Arc<Store<C>>,
    config: OrchestratorConfig,
    execution: ExecutionService,
    quality: Arc<QualityService>,
    executor: Option<Arc<dyn ExecutorAdapter>>,
    run_ids: Box<dyn Fn() -> RunId + Send + Sync>,
}

/// The protocol/step orchestrator. Cheap to clone.
pub struct Orchestrator<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        store: Arc<Store<C>>,
        engines: Arc<RwLock<EngineRegistry>>,
        gates: Arc<RwLock<GateRegistry>>,
        executor: Option<Arc<dyn ExecutorAdapter>>,
        config: OrchestratorConfig,
    ) -> Self {
        let execution = ExecutionService::new(
            Arc::clone(&engines),
            config.logs_dir.clone(),
            config.default_engine_id.clone(),
            config.engine_timeout,
        );
        let quality = Arc::new(QualityService::new(
            gates,
            config.qa_direct_complete,
            config.qa_max_auto_fix_attempts,
        ));
        let id_gen = UuidRunIdGen;
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                execution,
                quality,
                executor,
                run_ids: Box::new(move || id_gen.next()),
            }),
        }
    }

    /// Replace the run-id generator (deterministic tests).
    pub fn with_run_id_gen(self, gen: impl RunIdGen + 'static) -> Self {
        let mut inner = Arc::try_unwrap(self.inner)
            .unwrap_or_else(|_| panic_on_shared());
        inner.run_ids = Box::new(move || gen.next());
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn store(&self) -> &Arc<Store<C>> {
        &self.inner.store
    }

    // === protocol lifecycle ===

    pub fn create_protocol_run(
        &self,
        new: NewProtocolRun,
    ) -> Result<(ProtocolRun, Vec<StepRun>), OrchestratorError> {
        Ok(self.inner.store.create_protocol_run(new)?)
    }

    /// Start a protocol: `pending -> planning` (and straight to
    /// `planned` when steps already exist), or `planned -> running`.
    pub fn start_protocol(&self, id: ProtocolRunId) -> Result<ProtocolRun, OrchestratorError> {
        let (run, _) = self
            .inner
            .store
            .apply_protocol_op(id, ProtocolOp::Start, None)?;

        if run.status == ProtocolStatus::Planning
            && !self.inner.store.steps_for_protocol(id).is_empty()
        {
            let run = self.inner.store.set_protocol_status(
                id,
                &[ProtocolStatus::Planning],
                ProtocolStatus::Planned,
                Some("planning complete".into()),
            )?;
            return Ok(run);
        }
        Ok(run)
    }

    /// Record the output of an external planning pass and move the
    /// protocol to `planned`.
    pub fn complete_planning(
        &self,
        id: ProtocolRunId,
        steps: &[dg_core::StepTemplate],
    ) -> Result<ProtocolRun, OrchestratorError> {
        if !steps.is_empty() {
            self.inner.store.add_steps(id, steps)?;
        }
        Ok(self.inner.store.set_protocol_status(
            id,
            &[ProtocolStatus::Planning],
            ProtocolStatus::Planned,
            Some("planning complete".into()),
        )?)
    }

    pub fn pause_protocol(&self, id: ProtocolRunId) -> Result<ProtocolRun, OrchestratorError> {
        let (run, _) = self
            .inner
            .store
            .apply_protocol_op(id, ProtocolOp::Pause, None)?;
        Ok(run)
    }

    pub fn resume_protocol(&self, id: ProtocolRunId) -> Result<ProtocolRun, OrchestratorError> {
        let (run, _) = self
            .inner
            .store
            .apply_protocol_op(id, ProtocolOp::Resume, None)?;
        Ok(run)
    }

    /// Cancel a protocol and every non-terminal step under it.
    /// In-flight external jobs are not killed synchronously; the next
    /// reconciliation converges them.
    pub fn cancel_protocol(&self, id: ProtocolRunId) -> Result<ProtocolRun, OrchestratorError> {
        let (run, changed) = self
            .inner
            .store
            .apply_protocol_op(id, ProtocolOp::Cancel, None)?;
        if changed {
            for step in self.inner.store.steps_for_protocol(id) {
                if !step.status.is_terminal() {
                    self.inner.store.set_step_status(
                        step.id,
                        &[step.status],
                        StepStatus::Cancelled,
                        StepUpdate {
                            reason: Some("protocol cancelled".into()),
                            ..Default::default()
                        },
                    )?;
                }
            }
        }
        Ok(run)
    }

    // === step operations ===

    fn load_step_context(
        &self,
        step_id: StepRunId,
    ) -> Result<(StepRun, ProtocolRun, Project), OrchestratorError> {
        let step = self.inner.store.get_step_run(step_id)?;
        let run = self.inner.store.get_protocol_run(step.protocol_run_id)?;
        let project = self.inner.store.get_project(run.project_id)?;
        Ok((step, run, project))
    }

    /// Run a step from `pending`/`failed`/`blocked`.
    pub async fn run_step(
        &self,
        step_id: StepRunId,
        engine_id: Option<String>,
        model: Option<String>,
    ) -> Result<StepRun, OrchestratorError> {
        let step = self.inner.store.set_step_status(
            step_id,
            RUN_FROM,
            StepStatus::Running,
            StepUpdate {
                reason: Some("run_step".into()),
                ..Default::default()
            },
        )?;
        self.dispatch(step, engine_id, model).await
    }

    /// Retry a step from `failed`/`timeout`/`blocked`, bumping the
    /// retry counter in `runtime_state`.
    pub async fn retry_step(
        &self,
        step_id: StepRunId,
        engine_id: Option<String>,
        model: Option<String>,
    ) -> Result<StepRun, OrchestratorError> {
        let current = self.inner.store.get_step_run(step_id)?;
        let step = self.inner.store.set_step_status(
            step_id,
            RETRY_FROM,
            StepStatus::Running,
            StepUpdate {
                reason: Some("retry_step".into()),
                runtime_state: Some(current.runtime_state_with_incremented("retry_count")),
                ..Default::default()
            },
        )?;
        self.dispatch(step, engine_id, model).await
    }

    /// Move a running step into QA and evaluate it.
    pub async fn run_step_qa(&self, step_id: StepRunId) -> Result<QaResult, OrchestratorError> {
        let step = if self.inner.config.qa_direct_complete {
            self.inner.store.get_step_run(step_id)?
        } else {
            self.inner.store.set_step_status(
                step_id,
                &[StepStatus::Running],
                StepStatus::NeedsQa,
                StepUpdate {
                    reason: Some("qa requested".into()),
                    ..Default::default()
                },
            )?
        };
        self.evaluate_quality(step).await
    }

    /// Gate evaluation is filesystem-heavy; run it off the reactor.
    async fn evaluate_quality(&self, step: StepRun) -> Result<QaResult, OrchestratorError> {
        let (step, run, project) = self.load_step_context(step.id)?;
        let store = Arc::clone(&self.inner.store);
        let quality = Arc::clone(&self.inner.quality);
        tokio::task::spawn_blocking(move || quality.evaluate_step(&store, &step, &run, &project))
            .await
            .map_err(|e| OrchestratorError::Configuration(format!("qa task failed: {e}")))?
    }

    /// Dispatch an already-`running` step. Both modes create the JobRun
    /// row before any side effect.
    async fn dispatch(
        &self,
        step: StepRun,
        engine_id: Option<String>,
        model: Option<String>,
    ) -> Result<StepRun, OrchestratorError> {
        let run = self.inner.store.get_protocol_run(step.protocol_run_id)?;
        let project = self.inner.store.get_project(run.project_id)?;

        let run_id = (self.inner.run_ids)();
        let log_path = self.inner.execution.run_log_path(run_id.as_str());
        let job = self.inner.store.create_job_run(NewJobRun {
            run_id: run_id.clone(),
            job_type: "execute_step".into(),
            project_id: Some(project.id),
            protocol_run_id: Some(run.id),
            step_run_id: Some(step.id),
            windmill_job_id: None,
            params: serde_json::json!({
                "engine_id": engine_id.clone(),
                "model": model.clone(),
                "step_index": step.step_index,
            }),
            log_path: Some(log_path),
        })?;

        match self.inner.config.dispatch_mode {
            DispatchMode::External => {
                self.dispatch_external(step, run, project, job).await
            }
            DispatchMode::Local => {
                self.dispatch_local(step, run, project, job, engine_id, model)
                    .await
            }
        }
    }

    async fn dispatch_external(
        &self,
        step: StepRun,
        run: ProtocolRun,
        project: Project,
        job: dg_core::JobRun,
    ) -> Result<StepRun, OrchestratorError> {
        let Some(executor) = self.inner.executor.as_ref() else {
            let message = "external dispatch requested but no executor configured".to_string();
            self.fail_dispatch(&step, &job, &message)?;
            return Err(OrchestratorError::Configuration(message));
        };

        let payload = serde_json::json!({
            "run_id": job.run_id.clone(),
            "step_run_id": step.id,
            "protocol_run_id": run.id,
            "project_id": project.id,
            "params": job.params.clone(),
        });

        match executor
            .run_script(&self.inner.config.windmill_script_path, &payload)
            .await
        {
            Ok(windmill_job_id) => {
                self.inner.store.set_job_status(
                    &job.run_id,
                    dg_core::JobStatus::Queued,
                    JobUpdate {
                        windmill_job_id: Some(windmill_job_id.clone()),
                        ..Default::default()
                    },
                )?;
                self.inner.store.record_step_dispatched(
                    &step,
                    &job.run_id,
                    DispatchMode::External,
                    Some(windmill_job_id),
                )?;
                Ok(self.inner.store.get_step_run(step.id)?)
            }
            Err(e) => {
                self.fail_dispatch(&step, &job, &e.to_string())?;
                Err(e.into())
            }
        }
    }

    /// Dispatch failure: the step returns to `pending`, the job is
    /// failed, and a dispatch_failed event is recorded.
    fn fail_dispatch(
        &self,
        step: &StepRun,
        job: &dg_core::JobRun,
        error: &str,
    ) -> Result<(), OrchestratorError> {
        warn!(step = %step.id, error, "dispatch failed");
        self.inner
            .store
            .record_dispatch_failed(step, &job.run_id, error.to_string())?;
        self.inner.store.set_job_status(
            &job.run_id,
            dg_core::JobStatus::Failed,
            JobUpdate {
                error: Some(error.to_string()),
                ..Default::default()
            },
        )?;
        self.inner.store.set_step_status(
            step.id,
            &[StepStatus::Running],
            StepStatus::Pending,
            StepUpdate {
                reason: Some("dispatch failed".into()),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    async fn dispatch_local(
        &self,
        step: StepRun,
        run: ProtocolRun,
        project: Project,
        job: dg_core::JobRun,
        engine_id: Option<String>,
        model: Option<String>,
    ) -> Result<StepRun, OrchestratorError> {
        self.inner
            .store
            .record_step_dispatched(&step, &job.run_id, DispatchMode::Local, None)?;

        let outcome = match self
            .inner
            .execution
            .execute_step(
                &self.inner.store,
                &step,
                &run,
                &project,
                &job,
                engine_id.as_deref(),
                model.as_deref(),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(OrchestratorError::AgentUnavailable(message)) => {
                self.inner.store.set_job_status(
                    &job.run_id,
                    dg_core::JobStatus::Failed,
                    JobUpdate {
                        error: Some(message.clone()),
                        ..Default::default()
                    },
                )?;
                self.block_step(&step, &run, &project, &message)?;
                return Err(OrchestratorError::AgentUnavailable(message));
            }
            Err(e) => {
                self.inner.store.set_job_status(
                    &job.run_id,
                    dg_core::JobStatus::Failed,
                    JobUpdate {
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                )?;
                self.inner.store.set_step_status(
                    step.id,
                    &[StepStatus::Running],
                    StepStatus::Failed,
                    StepUpdate {
                        summary: Some(e.to_string()),
                        ..Default::default()
                    },
                )?;
                return Err(e);
            }
        };

        if outcome.timed_out {
            self.inner.store.set_job_status(
                &job.run_id,
                dg_core::JobStatus::Failed,
                JobUpdate {
                    error: outcome.error.clone(),
                    ..Default::default()
                },
            )?;
            self.inner.store.set_step_status(
                step.id,
                &[StepStatus::Running],
                StepStatus::Timeout,
                StepUpdate {
                    summary: outcome.error.clone(),
                    ..Default::default()
                },
            )?;
            return Err(OrchestratorError::Timeout(
                self.inner.config.engine_timeout.as_secs(),
            ));
        }

        if let Some(question) = outcome.blocked.clone() {
            self.inner.store.set_job_status(
                &job.run_id,
                dg_core::JobStatus::Succeeded,
                JobUpdate {
                    result: Some(serde_json::json!({"blocked": question.clone()})),
                    ..Default::default()
                },
            )?;
            self.block_step(&step, &run, &project, &question)?;
            return Ok(self.inner.store.get_step_run(step.id)?);
        }

        if outcome.success {
            self.inner.store.set_job_status(
                &job.run_id,
                dg_core::JobStatus::Succeeded,
                JobUpdate {
                    result: Some(serde_json::json!({
                        "engine_id": outcome.engine_id.clone(),
                        "exit_code": 0,
                    })),
                    ..Default::default()
                },
            )?;
            info!(step = %step.id, engine = %outcome.engine_id, "execution succeeded");

            let step = if self.inner.config.qa_direct_complete {
                self.inner.store.get_step_run(step.id)?
            } else {
                self.inner.store.set_step_status(
                    step.id,
                    &[StepStatus::Running],
                    StepStatus::NeedsQa,
                    StepUpdate {
                        reason: Some("execution complete".into()),
                        ..Default::default()
                    },
                )?
            };
            self.evaluate_quality(step.clone()).await?;
            return Ok(self.inner.store.get_step_run(step.id)?);
        }

        // Agent crash or failing exit: escalate to failed with a summary.
        self.inner.store.set_job_status(
            &job.run_id,
            dg_core::JobStatus::Failed,
            JobUpdate {
                error: outcome.error.clone(),
                ..Default::default()
            },
        )?;
        let step = self.inner.store.set_step_status(
            step.id,
            &[StepStatus::Running],
            StepStatus::Failed,
            StepUpdate {
                summary: outcome.error.clone(),
                ..Default::default()
            },
        )?;
        Ok(step)
    }

    /// Block a step behind a clarification.
    fn block_step(
        &self,
        step: &StepRun,
        run: &ProtocolRun,
        project: &Project,
        question: &str,
    ) -> Result<(), OrchestratorError> {
        self.inner.store.set_step_status(
            step.id,
            &[StepStatus::Running],
            StepStatus::Blocked,
            StepUpdate {
                reason: Some("execution blocked".into()),
                summary: Some(question.to_string()),
                ..Default::default()
            },
        )?;
        self.inner.store.upsert_clarification(NewClarification {
            scope: format!("step:{}:execution", step.id),
            project_id: project.id,
            protocol_run_id: Some(run.id),
            step_run_id: Some(step.id),
            key: "execution".into(),
            question: question.to_string(),
            recommended: None,
            options: Vec::new(),
            applies_to: "execution".into(),
            blocking: true,
        })?;
        Ok(())
    }

    // === completion & recovery ===

    /// The protocol is complete iff every step is terminal. Any
    /// `failed`/`timeout` step fails the protocol; otherwise it
    /// completes. A protocol with no steps is never auto-completed.
    pub fn check_and_complete_protocol(
        &self,
        id: ProtocolRunId,
    ) -> Result<bool, OrchestratorError> {
        let run = self.inner.store.get_protocol_run(id)?;
        if run.status.is_terminal() {
            return Ok(true);
        }
        let steps = self.inner.store.steps_for_protocol(id);
        if steps.is_empty() || steps.iter().any(|s| !s.status.is_terminal()) {
            return Ok(false);
        }

        let failed = steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed | StepStatus::Timeout));
        let target = if failed {
            ProtocolStatus::Failed
        } else {
            ProtocolStatus::Completed
        };
        self.inner.store.set_protocol_status(
            id,
            PROTOCOL_OPEN,
            target,
            Some("all steps terminal".into()),
        )?;
        Ok(true)
    }

    /// Sweep non-terminal protocols with nothing in flight and either
    /// complete them, block them, or surface their next pending step as
    /// a dispatch request. Single-threaded per sweep by construction.
    pub fn recover_stuck_protocols(&self) -> Result<Vec<RecoveryOutcome>, OrchestratorError> {
        let mut outcomes = Vec::new();

        for run in self.inner.store.list_protocol_runs(None, 0) {
            if run.status.is_terminal() {
                continue;
            }
            let steps = self.inner.store.steps_for_protocol(run.id);
            if steps.is_empty() {
                continue;
            }
            if steps
                .iter()
                .any(|s| matches!(s.status, StepStatus::Running | StepStatus::NeedsQa))
            {
                continue;
            }

            let outcome = if steps.iter().all(|s| s.status.is_terminal()) {
                self.check_and_complete_protocol(run.id)?;
                RecoveryOutcome {
                    protocol_run_id: run.id,
                    action: RecoveryAction::Completed,
                    step_run_id: None,
                }
            } else if steps.iter().any(|s| {
                matches!(
                    s.status,
                    StepStatus::Failed | StepStatus::Timeout | StepStatus::Blocked
                )
            }) && !steps.iter().any(|s| s.status == StepStatus::Pending)
            {
                if run.status == ProtocolStatus::Blocked {
                    continue;
                }
                self.inner.store.set_protocol_status(
                    run.id,
                    PROTOCOL_OPEN,
                    ProtocolStatus::Blocked,
                    Some("recovery: steps need attention".into()),
                )?;
                RecoveryOutcome {
                    protocol_run_id: run.id,
                    action: RecoveryAction::Blocked,
                    step_run_id: None,
                }
            } else {
                let Some(next) = steps.iter().find(|s| s.status == StepStatus::Pending) else {
                    continue;
                };
                RecoveryOutcome {
                    protocol_run_id: run.id,
                    action: RecoveryAction::EnqueuedStep,
                    step_run_id: Some(next.id),
                }
            };

            self.inner.store.record_recovery(
                outcome.protocol_run_id,
                outcome.action,
                outcome.step_run_id,
            )?;
            info!(
                protocol = %outcome.protocol_run_id,
                action = %outcome.action,
                "recovery action"
            );
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

fn panic_on_shared<T>() -> T {
    // with_run_id_gen is a constructor-time builder; the orchestrator
    // has not been shared yet when it runs.
    unreachable!("with_run_id_gen called on a shared orchestrator")
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
