// SPDX-License-Identifier: MIT

//! Transactional store facade.
//!
//! Every mutation validates against current state, appends one event (or
//! a fixed event sequence) under the store lock, applies it, and returns
//! the committed records. Status changes are guarded by an
//! expected-status check and fail with `InvalidTransition` without
//! touching the log. Within one store all commits are linearizable, so
//! per-protocol transition ordering follows directly.

use crate::checkpoint::{CheckpointHandle, Checkpointer};
use crate::log::{EventLog, EventLogError};
use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::MaterializedState;
use dg_core::{
    Artifact, ArtifactKind, Clarification, ClarificationId, ClarificationStatus, Clock,
    DispatchMode, Event, EventFilter, EventRecord, Finding, GateOutcome, InvalidTransition,
    JobRun, JobStatus, Project, ProjectId, ProjectStatus, ProtocolOp, ProtocolRun, ProtocolRunId,
    ProtocolStatus, QaResult, QaResultId, RecoveryAction, RunId, SpecRun, SpecRunId,
    SpecRunStatus, StepRun, StepRunId, StepStatus, StepTemplate, SystemClock, Verdict,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;

/// Cap for `recent_events` queries.
pub const RECENT_EVENTS_MAX: usize = 200;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log error: {0}")]
    Log(#[from] EventLogError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// File locations backing a store.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub log_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl StorePaths {
    /// Conventional layout under a state directory.
    pub fn under(state_dir: &Path) -> Self {
        Self {
            log_path: state_dir.join("wal").join("events.wal"),
            snapshot_path: state_dir.join("snapshot.zst"),
        }
    }
}

/// Parameters for creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub git_url: Option<String>,
    pub base_branch: Option<String>,
    pub local_path: Option<PathBuf>,
    pub policy_overrides: Option<serde_json::Value>,
}

/// Field updates for a project; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub git_url: Option<String>,
    pub base_branch: Option<String>,
    pub local_path: Option<PathBuf>,
    pub constitution_hash: Option<String>,
    pub policy_overrides: Option<serde_json::Value>,
}

/// Parameters for creating a protocol run.
#[derive(Debug, Clone)]
pub struct NewProtocolRun {
    pub project_id: ProjectId,
    pub protocol_name: String,
    pub base_branch: Option<String>,
    pub description: String,
    pub windmill_flow_id: Option<String>,
    pub template_config: Option<serde_json::Value>,
}

impl NewProtocolRun {
    pub fn new(project_id: ProjectId, protocol_name: impl Into<String>) -> Self {
        Self {
            project_id,
            protocol_name: protocol_name.into(),
            base_branch: None,
            description: String::new(),
            windmill_flow_id: None,
            template_config: None,
        }
    }
}

/// Parameters for creating a job run.
#[derive(Debug, Clone)]
pub struct NewJobRun {
    pub run_id: RunId,
    pub job_type: String,
    pub project_id: Option<ProjectId>,
    pub protocol_run_id: Option<ProtocolRunId>,
    pub step_run_id: Option<StepRunId>,
    pub windmill_job_id: Option<String>,
    pub params: serde_json::Value,
    pub log_path: Option<PathBuf>,
}

/// Parameters for upserting a clarification.
#[derive(Debug, Clone)]
pub struct NewClarification {
    pub scope: String,
    pub project_id: ProjectId,
    pub protocol_run_id: Option<ProtocolRunId>,
    pub step_run_id: Option<StepRunId>,
    pub key: String,
    pub question: String,
    pub recommended: Option<String>,
    pub options: Vec<String>,
    pub applies_to: String,
    pub blocking: bool,
}

/// Parameters for recording a QA evaluation.
#[derive(Debug, Clone)]
pub struct NewQaResult {
    pub protocol_run_id: ProtocolRunId,
    pub project_id: ProjectId,
    pub step_run_id: Option<StepRunId>,
    pub verdict: Verdict,
    pub gate_results: Vec<GateOutcome>,
    pub findings: Vec<Finding>,
}

/// Parameters for indexing an artifact.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub run_id: Option<RunId>,
    pub step_run_id: Option<StepRunId>,
    pub name: String,
    pub kind: Option<ArtifactKind>,
    pub path: PathBuf,
    pub bytes: Option<u64>,
}

/// Parameters for creating a spec run.
#[derive(Debug, Clone)]
pub struct NewSpecRun {
    pub project_id: ProjectId,
    pub spec_name: String,
    pub spec_root: Option<PathBuf>,
    pub spec_path: Option<PathBuf>,
    pub branch_name: Option<String>,
    pub base_branch: Option<String>,
}

/// Optional extras accompanying a step status change.
#[derive(Debug, Clone, Default)]
pub struct StepUpdate {
    pub reason: Option<String>,
    pub summary: Option<String>,
    pub runtime_state: Option<serde_json::Value>,
}

/// Optional extras accompanying a job status change.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub windmill_job_id: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

struct Inner {
    log: EventLog,
    state: MaterializedState,
}

/// The single source of truth for all durable state.
pub struct Store<C: Clock = SystemClock> {
    inner: Mutex<Inner>,
    clock: C,
    last_id_tx: watch::Sender<u64>,
    checkpointer: Checkpointer,
}

impl Store<SystemClock> {
    /// Open a store with the system clock.
    pub fn open(paths: &StorePaths) -> Result<Self, StoreError> {
        Self::open_with_clock(paths, SystemClock)
    }
}

impl<C: Clock> Store<C> {
    /// Open a store: load the snapshot if present, replay the log tail.
    pub fn open_with_clock(paths: &StorePaths, clock: C) -> Result<Self, StoreError> {
        let mut log = EventLog::open(&paths.log_path)?;

        let (mut state, replay_from) = match Snapshot::load(&paths.snapshot_path)? {
            Some(snapshot) => (snapshot.state, snapshot.last_event_id),
            None => (MaterializedState::default(), 0),
        };

        for record in log.entries_after(replay_from)? {
            state.apply_event(&record.event);
        }

        let last_id = log.last_id();
        let (last_id_tx, _) = watch::channel(last_id);

        Ok(Self {
            inner: Mutex::new(Inner { log, state }),
            clock,
            last_id_tx,
            checkpointer: Checkpointer::new(paths.snapshot_path.clone()),
        })
    }

    fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Append an event, apply it, and pay the deferred fsync when the
    /// group-commit window is up. Must run with the inner lock held.
    fn commit(inner: &mut Inner, event: Event, ts_ms: u64) -> Result<EventRecord, StoreError> {
        let record = inner.log.append(event, ts_ms)?;
        inner.state.apply_event(&record.event);
        if inner.log.sync_due() {
            inner.log.sync()?;
        }
        Ok(record)
    }

    fn notify(&self, last_id: u64) {
        let _ = self.last_id_tx.send(last_id);
    }

    /// Make all acknowledged commits durable.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.inner.lock().log.sync()?;
        Ok(())
    }

    /// Pay the deferred fsync when the group-commit window has elapsed.
    pub fn maybe_flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.log.sync_due() {
            inner.log.sync()?;
        }
        Ok(())
    }

    // === projects ===

    pub fn create_project(&self, new: NewProject) -> Result<Project, StoreError> {
        if new.name.trim().is_empty() {
            return Err(StoreError::Validation("project name must be non-empty".into()));
        }
        let now = self.now();
        let mut inner = self.inner.lock();
        let project = Project {
            id: inner.state.next_project_id(),
            name: new.name,
            git_url: new.git_url,
            base_branch: new.base_branch.unwrap_or_else(|| "main".to_string()),
            local_path: new.local_path,
            status: ProjectStatus::Active,
            constitution_hash: None,
            policy_overrides: new.policy_overrides,
            created_at_ms: now,
            updated_at_ms: now,
        };
        let record = Self::commit(
            &mut inner,
            Event::ProjectCreated {
                project: project.clone(),
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(project)
    }

    pub fn update_project(
        &self,
        id: ProjectId,
        update: ProjectUpdate,
    ) -> Result<Project, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let mut project = inner
            .state
            .get_project(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", id))?;
        if let Some(name) = update.name {
            project.name = name;
        }
        if let Some(git_url) = update.git_url {
            project.git_url = Some(git_url);
        }
        if let Some(base_branch) = update.base_branch {
            project.base_branch = base_branch;
        }
        if let Some(local_path) = update.local_path {
            project.local_path = Some(local_path);
        }
        if let Some(hash) = update.constitution_hash {
            project.constitution_hash = Some(hash);
        }
        if let Some(policy) = update.policy_overrides {
            project.policy_overrides = Some(policy);
        }
        project.updated_at_ms = now;
        let record = Self::commit(
            &mut inner,
            Event::ProjectUpdated {
                project: project.clone(),
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(project)
    }

    pub fn archive_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let project = inner
            .state
            .get_project(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", id))?;
        project.archive()?;
        let record = Self::commit(
            &mut inner,
            Event::ProjectArchived {
                project_id: id,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .get_project(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    pub fn unarchive_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let project = inner
            .state
            .get_project(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", id))?;
        project.unarchive()?;
        let record = Self::commit(
            &mut inner,
            Event::ProjectUnarchived {
                project_id: id,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .get_project(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    /// Hard deletion; cascades to protocol runs, steps, jobs,
    /// clarifications, QA results, and artifacts.
    pub fn delete_project(&self, id: ProjectId) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        if inner.state.get_project(id).is_none() {
            return Err(StoreError::not_found("project", id));
        }
        let record = Self::commit(
            &mut inner,
            Event::ProjectDeleted {
                project_id: id,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        self.inner
            .lock()
            .state
            .get_project(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", id))
    }

    pub fn list_projects(&self, status: Option<ProjectStatus>) -> Vec<Project> {
        let inner = self.inner.lock();
        let mut projects: Vec<Project> = inner
            .state
            .projects
            .values()
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .cloned()
            .collect();
        projects.sort_by_key(|p| p.id);
        projects
    }

    // === protocol runs ===

    /// Create a protocol run in `pending`, seeding steps from the
    /// template config when one is provided.
    pub fn create_protocol_run(
        &self,
        new: NewProtocolRun,
    ) -> Result<(ProtocolRun, Vec<StepRun>), StoreError> {
        if new.protocol_name.trim().is_empty() {
            return Err(StoreError::Validation(
                "protocol name must be non-empty".into(),
            ));
        }
        let now = self.now();
        let mut inner = self.inner.lock();
        let project = inner
            .state
            .get_project(new.project_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("project", new.project_id))?;

        let run = ProtocolRun {
            id: inner.state.next_protocol_run_id(),
            project_id: project.id,
            protocol_name: new.protocol_name,
            status: ProtocolStatus::Pending,
            base_branch: new.base_branch.unwrap_or(project.base_branch),
            worktree_path: None,
            protocol_root: None,
            description: new.description,
            windmill_flow_id: new.windmill_flow_id,
            template_config: new.template_config.clone(),
            created_at_ms: now,
            updated_at_ms: now,
        };
        let mut last = Self::commit(&mut inner, Event::ProtocolCreated { run: run.clone() }, now)?;

        let templates = new
            .template_config
            .as_ref()
            .map(|c| StepTemplate::from_template_config(c))
            .unwrap_or_default();
        let mut steps = Vec::with_capacity(templates.len());
        for (index, template) in templates.iter().enumerate() {
            let step = Self::step_from_template(&mut inner, run.id, index as u32, template, now);
            last = Self::commit(&mut inner, Event::StepCreated { step: step.clone() }, now)?;
            steps.push(step);
        }

        drop(inner);
        self.notify(last.id);
        Ok((run, steps))
    }

    fn step_from_template(
        inner: &mut Inner,
        protocol_run_id: ProtocolRunId,
        step_index: u32,
        template: &StepTemplate,
        now: u64,
    ) -> StepRun {
        StepRun {
            id: inner.state.next_step_run_id(),
            protocol_run_id,
            step_index,
            step_name: template.step_name.clone(),
            step_type: template.step_type.clone(),
            status: StepStatus::Pending,
            priority: template.priority,
            assigned_agent: template.assigned_agent.clone(),
            model: template.model.clone(),
            summary: None,
            runtime_state: None,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Append steps to an existing protocol (planning output).
    pub fn add_steps(
        &self,
        protocol_run_id: ProtocolRunId,
        templates: &[StepTemplate],
    ) -> Result<Vec<StepRun>, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        if inner.state.get_protocol_run(protocol_run_id).is_none() {
            return Err(StoreError::not_found("protocol_run", protocol_run_id));
        }
        let next_index = inner
            .state
            .steps_for_protocol(protocol_run_id)
            .last()
            .map(|s| s.step_index + 1)
            .unwrap_or(0);

        let mut steps = Vec::with_capacity(templates.len());
        let mut last = None;
        for (offset, template) in templates.iter().enumerate() {
            let step = Self::step_from_template(
                &mut inner,
                protocol_run_id,
                next_index + offset as u32,
                template,
                now,
            );
            last = Some(Self::commit(
                &mut inner,
                Event::StepCreated { step: step.clone() },
                now,
            )?);
            steps.push(step);
        }
        drop(inner);
        if let Some(record) = last {
            self.notify(record.id);
        }
        Ok(steps)
    }

    /// Replace mutable non-status fields (worktree, root, flow id).
    pub fn update_protocol_run(&self, run: ProtocolRun) -> Result<ProtocolRun, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let current = inner
            .state
            .get_protocol_run(run.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("protocol_run", run.id))?;
        // Status changes go through apply_protocol_op / set_protocol_status.
        let mut updated = run;
        updated.status = current.status;
        updated.updated_at_ms = now;
        let record = Self::commit(
            &mut inner,
            Event::ProtocolUpdated {
                run: updated.clone(),
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    /// Apply a lifecycle operation with the legality table.
    ///
    /// Returns the run and whether anything changed (`false` for the
    /// cancel-on-settled no-op). Illegal operations fail without
    /// mutating the store.
    pub fn apply_protocol_op(
        &self,
        id: ProtocolRunId,
        op: ProtocolOp,
        reason: Option<String>,
    ) -> Result<(ProtocolRun, bool), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let run = inner
            .state
            .get_protocol_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("protocol_run", id))?;
        let next = run.status.apply(op)?;
        if next == run.status {
            return Ok((run, false));
        }
        let record = Self::commit(
            &mut inner,
            Event::ProtocolStatusChanged {
                protocol_run_id: id,
                project_id: run.project_id,
                previous: run.status,
                new: next,
                reason,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .get_protocol_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("protocol_run", id))?;
        drop(inner);
        self.notify(record.id);
        Ok((updated, true))
    }

    /// Orchestrator-internal move guarded by an expected-status set.
    pub fn set_protocol_status(
        &self,
        id: ProtocolRunId,
        expected: &[ProtocolStatus],
        new: ProtocolStatus,
        reason: Option<String>,
    ) -> Result<ProtocolRun, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let run = inner
            .state
            .get_protocol_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("protocol_run", id))?;
        if !expected.contains(&run.status) {
            return Err(InvalidTransition::new("protocol_run", run.status, new).into());
        }
        if run.status == new {
            return Ok(run);
        }
        let record = Self::commit(
            &mut inner,
            Event::ProtocolStatusChanged {
                protocol_run_id: id,
                project_id: run.project_id,
                previous: run.status,
                new,
                reason,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .get_protocol_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("protocol_run", id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    pub fn get_protocol_run(&self, id: ProtocolRunId) -> Result<ProtocolRun, StoreError> {
        self.inner
            .lock()
            .state
            .get_protocol_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("protocol_run", id))
    }

    pub fn list_protocol_runs(
        &self,
        project_id: Option<ProjectId>,
        limit: usize,
    ) -> Vec<ProtocolRun> {
        let inner = self.inner.lock();
        let mut runs: Vec<ProtocolRun> = inner
            .state
            .protocol_runs
            .values()
            .filter(|r| project_id.map(|p| r.project_id == p).unwrap_or(true))
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.id));
        if limit > 0 {
            runs.truncate(limit);
        }
        runs
    }

    // === steps ===

    pub fn get_step_run(&self, id: StepRunId) -> Result<StepRun, StoreError> {
        self.inner
            .lock()
            .state
            .get_step_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("step_run", id))
    }

    pub fn steps_for_protocol(&self, protocol_run_id: ProtocolRunId) -> Vec<StepRun> {
        self.inner
            .lock()
            .state
            .steps_for_protocol(protocol_run_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Active (non-terminal) steps, across all open protocols or within
    /// one.
    pub fn active_steps(&self, protocol_run_id: Option<ProtocolRunId>) -> Vec<StepRun> {
        self.inner
            .lock()
            .state
            .active_steps(protocol_run_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Guarded step transition; exactly one event on success.
    pub fn set_step_status(
        &self,
        id: StepRunId,
        expected: &[StepStatus],
        new: StepStatus,
        update: StepUpdate,
    ) -> Result<StepRun, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let step = inner
            .state
            .get_step_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("step_run", id))?;
        if !expected.contains(&step.status) {
            return Err(InvalidTransition::new("step_run", step.status, new).into());
        }
        if step.status == new && update.runtime_state.is_none() && update.summary.is_none() {
            return Ok(step);
        }
        let record = Self::commit(
            &mut inner,
            Event::StepStatusChanged {
                step_run_id: id,
                protocol_run_id: step.protocol_run_id,
                previous: step.status,
                new,
                reason: update.reason,
                summary: update.summary,
                runtime_state: update.runtime_state,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .get_step_run(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("step_run", id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    pub fn record_step_dispatched(
        &self,
        step: &StepRun,
        run_id: &RunId,
        mode: DispatchMode,
        windmill_job_id: Option<String>,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::StepDispatched {
                step_run_id: step.id,
                protocol_run_id: step.protocol_run_id,
                run_id: run_id.clone(),
                mode,
                windmill_job_id,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    pub fn record_dispatch_failed(
        &self,
        step: &StepRun,
        run_id: &RunId,
        error: String,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::DispatchFailed {
                step_run_id: step.id,
                protocol_run_id: step.protocol_run_id,
                run_id: run_id.clone(),
                error,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    // === job runs ===

    /// Create the durable dispatch record. Always precedes side effects.
    pub fn create_job_run(&self, new: NewJobRun) -> Result<JobRun, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        if inner.state.get_job_run(new.run_id.as_str()).is_some() {
            return Err(StoreError::Conflict(format!(
                "job run {} already exists",
                new.run_id
            )));
        }
        if let Some(ref wid) = new.windmill_job_id {
            if inner.state.job_by_windmill_id(wid).is_some() {
                return Err(StoreError::Conflict(format!(
                    "windmill_job_id {wid} already mapped"
                )));
            }
        }
        let job = JobRun {
            run_id: new.run_id,
            job_type: new.job_type,
            status: JobStatus::Queued,
            project_id: new.project_id,
            protocol_run_id: new.protocol_run_id,
            step_run_id: new.step_run_id,
            windmill_job_id: new.windmill_job_id,
            params: new.params,
            result: None,
            error: None,
            log_path: new.log_path,
            created_at_ms: now,
            started_at_ms: None,
            finished_at_ms: None,
        };
        let record = Self::commit(&mut inner, Event::JobCreated { job: job.clone() }, now)?;
        drop(inner);
        self.notify(record.id);
        Ok(job)
    }

    /// Move a job run's status.
    ///
    /// Returns the job and whether anything changed. Re-delivering the
    /// current status with no new fields is a no-op and emits no event.
    pub fn set_job_status(
        &self,
        run_id: &RunId,
        new: JobStatus,
        update: JobUpdate,
    ) -> Result<(JobRun, bool), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let job = inner
            .state
            .get_job_run(run_id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::not_found("job_run", run_id))?;

        let sets_windmill_id = match update.windmill_job_id {
            Some(ref wid) => job.windmill_job_id.as_deref() != Some(wid.as_str()),
            None => false,
        };
        if sets_windmill_id {
            if let Some(ref wid) = update.windmill_job_id {
                if inner.state.job_by_windmill_id(wid).is_some() {
                    return Err(StoreError::Conflict(format!(
                        "windmill_job_id {wid} already mapped"
                    )));
                }
            }
        }

        let changed = job.status != new
            || sets_windmill_id
            || (update.result.is_some() && job.result != update.result)
            || (update.error.is_some() && job.error != update.error);
        if !changed {
            return Ok((job, false));
        }

        let record = Self::commit(
            &mut inner,
            Event::JobStatusChanged {
                run_id: run_id.clone(),
                previous: job.status,
                new,
                windmill_job_id: update.windmill_job_id,
                result: update.result,
                error: update.error,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .get_job_run(run_id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::not_found("job_run", run_id))?;
        drop(inner);
        self.notify(record.id);
        Ok((updated, true))
    }

    pub fn get_job_run(&self, run_id: &str) -> Result<JobRun, StoreError> {
        self.inner
            .lock()
            .state
            .get_job_run(run_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("job_run", run_id))
    }

    pub fn job_by_windmill_id(&self, windmill_job_id: &str) -> Option<JobRun> {
        self.inner
            .lock()
            .state
            .job_by_windmill_id(windmill_job_id)
            .cloned()
    }

    pub fn latest_job_for_step(&self, step_run_id: StepRunId) -> Option<JobRun> {
        self.inner
            .lock()
            .state
            .latest_job_for_step(step_run_id)
            .cloned()
    }

    /// Filtered listing, newest first.
    #[allow(clippy::too_many_arguments)]
    pub fn list_job_runs(
        &self,
        project_id: Option<ProjectId>,
        protocol_run_id: Option<ProtocolRunId>,
        step_run_id: Option<StepRunId>,
        status: Option<JobStatus>,
        job_type: Option<&str>,
        limit: usize,
    ) -> Vec<JobRun> {
        let inner = self.inner.lock();
        let mut jobs: Vec<JobRun> = inner
            .state
            .job_runs
            .values()
            .filter(|j| project_id.map(|p| j.project_id == Some(p)).unwrap_or(true))
            .filter(|j| {
                protocol_run_id
                    .map(|p| j.protocol_run_id == Some(p))
                    .unwrap_or(true)
            })
            .filter(|j| step_run_id.map(|s| j.step_run_id == Some(s)).unwrap_or(true))
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .filter(|j| job_type.map(|t| j.job_type == t).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| b.run_id.as_str().cmp(a.run_id.as_str()))
        });
        if limit > 0 {
            jobs.truncate(limit);
        }
        jobs
    }

    // === clarifications ===

    /// Insert or refresh the clarification with this `(scope, key)`.
    pub fn upsert_clarification(
        &self,
        new: NewClarification,
    ) -> Result<Clarification, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let existing = inner
            .state
            .clarification_by_scope_key(&new.scope, &new.key)
            .cloned();

        let clarification = match existing {
            Some(mut current) => {
                current.question = new.question;
                current.recommended = new.recommended;
                current.options = new.options;
                current.applies_to = new.applies_to;
                current.blocking = new.blocking;
                current.status = ClarificationStatus::Open;
                current.answer = None;
                current.answered_by = None;
                current.updated_at_ms = now;
                current
            }
            None => Clarification {
                id: ClarificationId::new(inner.state.next_clarification_id()),
                scope: new.scope,
                project_id: new.project_id,
                protocol_run_id: new.protocol_run_id,
                step_run_id: new.step_run_id,
                key: new.key,
                question: new.question,
                recommended: new.recommended,
                options: new.options,
                applies_to: new.applies_to,
                blocking: new.blocking,
                status: ClarificationStatus::Open,
                answer: None,
                answered_by: None,
                created_at_ms: now,
                updated_at_ms: now,
            },
        };
        let record = Self::commit(
            &mut inner,
            Event::ClarificationUpserted {
                clarification: clarification.clone(),
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(clarification)
    }

    pub fn answer_clarification(
        &self,
        id: ClarificationId,
        answer: String,
        answered_by: String,
    ) -> Result<Clarification, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let clarification = inner
            .state
            .clarifications
            .get(&id.value())
            .cloned()
            .ok_or_else(|| StoreError::not_found("clarification", id))?;
        if clarification.status != ClarificationStatus::Open {
            return Err(InvalidTransition::new(
                "clarification",
                clarification.status,
                "answer",
            )
            .into());
        }
        let record = Self::commit(
            &mut inner,
            Event::ClarificationAnswered {
                clarification_id: id,
                answer,
                answered_by,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .clarifications
            .get(&id.value())
            .cloned()
            .ok_or_else(|| StoreError::not_found("clarification", id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    pub fn dismiss_clarification(&self, id: ClarificationId) -> Result<Clarification, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let clarification = inner
            .state
            .clarifications
            .get(&id.value())
            .cloned()
            .ok_or_else(|| StoreError::not_found("clarification", id))?;
        if clarification.status != ClarificationStatus::Open {
            return Err(InvalidTransition::new(
                "clarification",
                clarification.status,
                "dismiss",
            )
            .into());
        }
        let record = Self::commit(
            &mut inner,
            Event::ClarificationDismissed {
                clarification_id: id,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .clarifications
            .get(&id.value())
            .cloned()
            .ok_or_else(|| StoreError::not_found("clarification", id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    pub fn list_clarifications(
        &self,
        project_id: Option<ProjectId>,
        status: Option<ClarificationStatus>,
    ) -> Vec<Clarification> {
        let inner = self.inner.lock();
        let mut clarifications: Vec<Clarification> = inner
            .state
            .clarifications
            .values()
            .filter(|c| project_id.map(|p| c.project_id == p).unwrap_or(true))
            .filter(|c| status.map(|s| c.status == s).unwrap_or(true))
            .cloned()
            .collect();
        clarifications.sort_by_key(|c| c.id);
        clarifications
    }

    // === qa results ===

    /// Write exactly one QA result per evaluation.
    pub fn record_qa_evaluated(
        &self,
        new: NewQaResult,
        duration_ms: u64,
    ) -> Result<QaResult, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let result = QaResult {
            id: QaResultId::new(inner.state.next_qa_result_id()),
            protocol_run_id: new.protocol_run_id,
            project_id: new.project_id,
            step_run_id: new.step_run_id,
            verdict: new.verdict,
            gate_results: new.gate_results,
            findings: new.findings,
            created_at_ms: now,
        };
        let record = Self::commit(
            &mut inner,
            Event::QaEvaluated {
                result: result.clone(),
                duration_ms,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(result)
    }

    pub fn qa_results_for_step(&self, step_run_id: StepRunId) -> Vec<QaResult> {
        self.inner
            .lock()
            .state
            .qa_results_for_step(step_run_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn record_auto_fix_requested(
        &self,
        step: &StepRun,
        attempt: u32,
        rule_ids: Vec<String>,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::FeedbackAutoFixRequested {
                step_run_id: step.id,
                protocol_run_id: step.protocol_run_id,
                attempt,
                rule_ids,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    // === artifacts ===

    pub fn index_artifact(&self, new: NewArtifact) -> Result<Artifact, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let artifact = Artifact {
            id: dg_core::ArtifactId::new(inner.state.next_artifact_id()),
            run_id: new.run_id,
            step_run_id: new.step_run_id,
            kind: new.kind.unwrap_or_else(|| ArtifactKind::from_name(&new.name)),
            name: new.name,
            path: new.path,
            bytes: new.bytes,
            created_at_ms: now,
        };
        let record = Self::commit(
            &mut inner,
            Event::ArtifactIndexed {
                artifact: artifact.clone(),
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(artifact)
    }

    pub fn artifacts_for_step(&self, step_run_id: StepRunId) -> Vec<Artifact> {
        self.inner
            .lock()
            .state
            .artifacts_for_step(step_run_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn artifacts_for_run(&self, run_id: &RunId) -> Vec<Artifact> {
        self.inner
            .lock()
            .state
            .artifacts_for_run(run_id)
            .into_iter()
            .cloned()
            .collect()
    }

    // === reconciliation ===

    /// Apply a reconciliation fix: the event both audits and moves the
    /// step. Guarded on the previously observed status.
    pub fn record_reconciliation_auto_fix(
        &self,
        step: &StepRun,
        previous: StepStatus,
        new: StepStatus,
        windmill_job_id: String,
    ) -> Result<StepRun, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let current = inner
            .state
            .get_step_run(step.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("step_run", step.id))?;
        if current.status != previous {
            return Err(InvalidTransition::new("step_run", current.status, new).into());
        }
        let record = Self::commit(
            &mut inner,
            Event::ReconciliationAutoFix {
                step_run_id: step.id,
                protocol_run_id: step.protocol_run_id,
                previous,
                new,
                windmill_job_id,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .get_step_run(step.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("step_run", step.id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    pub fn record_reconciliation_manual(
        &self,
        step: &StepRun,
        windmill_status: String,
        windmill_job_id: String,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::ReconciliationManualRequired {
                step_run_id: step.id,
                protocol_run_id: step.protocol_run_id,
                db_status: step.status,
                windmill_status,
                windmill_job_id,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    pub fn record_reconciliation_error(
        &self,
        step: &StepRun,
        windmill_job_id: Option<String>,
        error: String,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::ReconciliationError {
                step_run_id: step.id,
                protocol_run_id: step.protocol_run_id,
                windmill_job_id,
                error,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    // === recovery / webhooks / spec runs ===

    pub fn record_recovery(
        &self,
        protocol_run_id: ProtocolRunId,
        action: RecoveryAction,
        step_run_id: Option<StepRunId>,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::ProtocolRecovered {
                protocol_run_id,
                action,
                step_run_id,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    pub fn record_webhook_orphan(
        &self,
        windmill_job_id: String,
        status: String,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::WebhookOrphanJob {
                windmill_job_id,
                status,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    pub fn record_ci_event(
        &self,
        provider: String,
        project_id: Option<ProjectId>,
        repo_url: String,
        summary: String,
    ) -> Result<(), StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let record = Self::commit(
            &mut inner,
            Event::CiEvent {
                provider,
                project_id,
                repo_url,
                summary,
                at_ms: now,
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(())
    }

    pub fn create_spec_run(&self, new: NewSpecRun) -> Result<SpecRun, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        if inner.state.get_project(new.project_id).is_none() {
            return Err(StoreError::not_found("project", new.project_id));
        }
        let spec_run = SpecRun {
            id: SpecRunId::new(inner.state.next_spec_run_id()),
            project_id: new.project_id,
            spec_name: new.spec_name,
            status: SpecRunStatus::Specifying,
            spec_root: new.spec_root,
            spec_path: new.spec_path,
            worktree_path: None,
            branch_name: new.branch_name,
            base_branch: new.base_branch,
            created_at_ms: now,
            updated_at_ms: now,
        };
        let record = Self::commit(
            &mut inner,
            Event::SpecRunCreated {
                spec_run: spec_run.clone(),
            },
            now,
        )?;
        drop(inner);
        self.notify(record.id);
        Ok(spec_run)
    }

    pub fn set_spec_run_status(
        &self,
        id: SpecRunId,
        new: SpecRunStatus,
    ) -> Result<SpecRun, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock();
        let spec_run = inner
            .state
            .spec_runs
            .get(&id.value())
            .cloned()
            .ok_or_else(|| StoreError::not_found("spec_run", id))?;
        if spec_run.status == new {
            return Ok(spec_run);
        }
        let record = Self::commit(
            &mut inner,
            Event::SpecRunStatusChanged {
                spec_run_id: id,
                previous: spec_run.status,
                new,
                at_ms: now,
            },
            now,
        )?;
        let updated = inner
            .state
            .spec_runs
            .get(&id.value())
            .cloned()
            .ok_or_else(|| StoreError::not_found("spec_run", id))?;
        drop(inner);
        self.notify(record.id);
        Ok(updated)
    }

    pub fn get_spec_run(&self, id: SpecRunId) -> Result<SpecRun, StoreError> {
        self.inner
            .lock()
            .state
            .spec_runs
            .get(&id.value())
            .cloned()
            .ok_or_else(|| StoreError::not_found("spec_run", id))
    }

    pub fn list_spec_runs(&self, project_id: Option<ProjectId>) -> Vec<SpecRun> {
        let inner = self.inner.lock();
        let mut spec_runs: Vec<SpecRun> = inner
            .state
            .spec_runs
            .values()
            .filter(|s| project_id.map(|p| s.project_id == p).unwrap_or(true))
            .cloned()
            .collect();
        spec_runs.sort_by_key(|s| s.id);
        spec_runs
    }

    // === events ===

    /// Events with id greater than `since_id`, oldest first, bounded by
    /// `limit` (0 = unbounded).
    pub fn events_after(
        &self,
        since_id: u64,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self.inner.lock().log.read_after(since_id, filter, limit)?)
    }

    /// Most recent events, newest first, capped at [`RECENT_EVENTS_MAX`].
    pub fn recent_events(
        &self,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let limit = limit.clamp(1, RECENT_EVENTS_MAX);
        let mut records = self.inner.lock().log.read_after(0, filter, 0)?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    pub fn last_event_id(&self) -> u64 {
        self.inner.lock().log.last_id()
    }

    /// Watch channel carrying the latest committed event id. SSE tailers
    /// sleep on this instead of polling blindly.
    pub fn watch_last_event_id(&self) -> watch::Receiver<u64> {
        self.last_id_tx.subscribe()
    }

    // === maintenance ===

    /// Start a background checkpoint of the current state.
    pub fn start_checkpoint(&self) -> Result<CheckpointHandle, StoreError> {
        let mut inner = self.inner.lock();
        inner.log.sync()?;
        let last_id = inner.log.last_id();
        Ok(self.checkpointer.start(last_id, &inner.state))
    }

    /// Synchronous checkpoint for shutdown.
    pub fn checkpoint_now(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.log.sync()?;
        let last_id = inner.log.last_id();
        self.checkpointer
            .checkpoint_sync(last_id, &inner.state)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        Ok(())
    }

    /// Check referential invariants (readiness probe, tests).
    pub fn check_invariants(&self) -> Result<(), StoreError> {
        self.inner
            .lock()
            .state
            .check_invariants()
            .map_err(StoreError::Validation)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
