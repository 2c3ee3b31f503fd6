// SPDX-License-Identifier: MIT

//! Materialized state derived from event log replay.

use dg_core::{
    Artifact, Clarification, ClarificationStatus, Event, JobRun, Project, ProjectId,
    ProjectStatus, ProtocolRun, ProtocolRunId, QaResult, RunId, SpecRun, StepRun, StepRunId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// High-water marks for store-assigned row ids.
///
/// Kept separately from the maps so deleted rows never surrender their
/// ids back to the allocator.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdCounters {
    #[serde(default)]
    pub project: u64,
    #[serde(default)]
    pub protocol_run: u64,
    #[serde(default)]
    pub step_run: u64,
    #[serde(default)]
    pub clarification: u64,
    #[serde(default)]
    pub qa_result: u64,
    #[serde(default)]
    pub artifact: u64,
    #[serde(default)]
    pub spec_run: u64,
}

/// Materialized state built from event replay.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub projects: HashMap<u64, Project>,
    pub protocol_runs: HashMap<u64, ProtocolRun>,
    pub step_runs: HashMap<u64, StepRun>,
    pub job_runs: HashMap<String, JobRun>,
    #[serde(default)]
    pub clarifications: HashMap<u64, Clarification>,
    #[serde(default)]
    pub qa_results: HashMap<u64, QaResult>,
    #[serde(default)]
    pub artifacts: HashMap<u64, Artifact>,
    #[serde(default)]
    pub spec_runs: HashMap<u64, SpecRun>,
    #[serde(default)]
    pub counters: IdCounters,
}

impl MaterializedState {
    // --- queries ---

    pub fn get_project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id.value())
    }

    pub fn get_protocol_run(&self, id: ProtocolRunId) -> Option<&ProtocolRun> {
        self.protocol_runs.get(&id.value())
    }

    pub fn get_step_run(&self, id: StepRunId) -> Option<&StepRun> {
        self.step_runs.get(&id.value())
    }

    pub fn get_job_run(&self, run_id: &str) -> Option<&JobRun> {
        self.job_runs.get(run_id)
    }

    /// Steps of a protocol ordered by `(step_index, id)`.
    pub fn steps_for_protocol(&self, protocol_run_id: ProtocolRunId) -> Vec<&StepRun> {
        let mut steps: Vec<&StepRun> = self
            .step_runs
            .values()
            .filter(|s| s.protocol_run_id == protocol_run_id)
            .collect();
        steps.sort_by_key(|s| (s.step_index, s.id));
        steps
    }

    /// Protocol runs of a project, newest first.
    pub fn protocols_for_project(&self, project_id: ProjectId) -> Vec<&ProtocolRun> {
        let mut runs: Vec<&ProtocolRun> = self
            .protocol_runs
            .values()
            .filter(|r| r.project_id == project_id)
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.id));
        runs
    }

    /// Most recent job run for a step (retries produce several).
    pub fn latest_job_for_step(&self, step_run_id: StepRunId) -> Option<&JobRun> {
        self.job_runs
            .values()
            .filter(|j| j.step_run_id == Some(step_run_id))
            .max_by_key(|j| (j.created_at_ms, j.run_id.as_str().to_string()))
    }

    pub fn job_by_windmill_id(&self, windmill_job_id: &str) -> Option<&JobRun> {
        self.job_runs
            .values()
            .find(|j| j.windmill_job_id.as_deref() == Some(windmill_job_id))
    }

    pub fn clarification_by_scope_key(&self, scope: &str, key: &str) -> Option<&Clarification> {
        self.clarifications
            .values()
            .find(|c| c.scope == scope && c.key == key)
    }

    pub fn qa_results_for_step(&self, step_run_id: StepRunId) -> Vec<&QaResult> {
        let mut results: Vec<&QaResult> = self
            .qa_results
            .values()
            .filter(|r| r.step_run_id == Some(step_run_id))
            .collect();
        results.sort_by_key(|r| r.id);
        results
    }

    pub fn artifacts_for_run(&self, run_id: &RunId) -> Vec<&Artifact> {
        let mut artifacts: Vec<&Artifact> = self
            .artifacts
            .values()
            .filter(|a| a.run_id.as_ref() == Some(run_id))
            .collect();
        artifacts.sort_by_key(|a| a.id);
        artifacts
    }

    pub fn artifacts_for_step(&self, step_run_id: StepRunId) -> Vec<&Artifact> {
        let mut artifacts: Vec<&Artifact> = self
            .artifacts
            .values()
            .filter(|a| a.step_run_id == Some(step_run_id))
            .collect();
        artifacts.sort_by_key(|a| a.id);
        artifacts
    }

    /// Active (non-terminal) steps across non-terminal protocols, or
    /// within one protocol when `protocol_run_id` is given.
    pub fn active_steps(&self, protocol_run_id: Option<ProtocolRunId>) -> Vec<&StepRun> {
        let mut steps: Vec<&StepRun> = self
            .step_runs
            .values()
            .filter(|s| !s.status.is_terminal())
            .filter(|s| match protocol_run_id {
                Some(id) => s.protocol_run_id == id,
                None => self
                    .protocol_runs
                    .get(&s.protocol_run_id.value())
                    .map(|p| !p.status.is_terminal())
                    .unwrap_or(false),
            })
            .collect();
        steps.sort_by_key(|s| (s.protocol_run_id, s.step_index, s.id));
        steps
    }

    // --- id allocation ---

    pub fn next_project_id(&self) -> ProjectId {
        ProjectId::new(self.counters.project + 1)
    }

    pub fn next_protocol_run_id(&self) -> ProtocolRunId {
        ProtocolRunId::new(self.counters.protocol_run + 1)
    }

    pub fn next_step_run_id(&self) -> StepRunId {
        StepRunId::new(self.counters.step_run + 1)
    }

    pub fn next_clarification_id(&self) -> u64 {
        self.counters.clarification + 1
    }

    pub fn next_qa_result_id(&self) -> u64 {
        self.counters.qa_result + 1
    }

    pub fn next_artifact_id(&self) -> u64 {
        self.counters.artifact + 1
    }

    pub fn next_spec_run_id(&self) -> u64 {
        self.counters.spec_run + 1
    }

    // --- event application ---

    /// Apply an event to derive state changes.
    ///
    /// All handlers MUST be idempotent: applying the same event twice
    /// must produce the same state as applying it once (events are
    /// re-applied during replay after a snapshot). Use assignment rather
    /// than arithmetic, and guard inserts with existence checks where a
    /// duplicate would clobber newer data.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            // === project ===
            Event::ProjectCreated { project } | Event::ProjectUpdated { project } => {
                self.counters.project = self.counters.project.max(project.id.value());
                self.projects.insert(project.id.value(), project.clone());
            }
            Event::ProjectArchived { project_id, at_ms } => {
                if let Some(project) = self.projects.get_mut(&project_id.value()) {
                    project.status = ProjectStatus::Archived;
                    project.updated_at_ms = *at_ms;
                }
            }
            Event::ProjectUnarchived { project_id, at_ms } => {
                if let Some(project) = self.projects.get_mut(&project_id.value()) {
                    project.status = ProjectStatus::Active;
                    project.updated_at_ms = *at_ms;
                }
            }
            Event::ProjectDeleted { project_id, .. } => {
                self.projects.remove(&project_id.value());
                let protocol_ids: Vec<u64> = self
                    .protocol_runs
                    .values()
                    .filter(|r| r.project_id == *project_id)
                    .map(|r| r.id.value())
                    .collect();
                for protocol_id in protocol_ids {
                    self.remove_protocol_cascade(protocol_id);
                }
                self.clarifications
                    .retain(|_, c| c.project_id != *project_id);
                self.qa_results.retain(|_, r| r.project_id != *project_id);
                self.spec_runs.retain(|_, s| s.project_id != *project_id);
                self.job_runs.retain(|_, j| {
                    j.project_id != Some(*project_id)
                });
            }

            // === protocol ===
            Event::ProtocolCreated { run } | Event::ProtocolUpdated { run } => {
                self.counters.protocol_run = self.counters.protocol_run.max(run.id.value());
                self.protocol_runs.insert(run.id.value(), run.clone());
            }
            Event::ProtocolStatusChanged {
                protocol_run_id,
                new,
                at_ms,
                ..
            } => {
                if let Some(run) = self.protocol_runs.get_mut(&protocol_run_id.value()) {
                    run.status = *new;
                    run.updated_at_ms = *at_ms;
                }
            }

            // === step ===
            Event::StepCreated { step } => {
                self.counters.step_run = self.counters.step_run.max(step.id.value());
                self.step_runs.insert(step.id.value(), step.clone());
            }
            Event::StepStatusChanged {
                step_run_id,
                new,
                summary,
                runtime_state,
                at_ms,
                ..
            } => {
                if let Some(step) = self.step_runs.get_mut(&step_run_id.value()) {
                    step.status = *new;
                    step.updated_at_ms = *at_ms;
                    if summary.is_some() {
                        step.summary = summary.clone();
                    }
                    if runtime_state.is_some() {
                        step.runtime_state = runtime_state.clone();
                    }
                }
            }

            // === job ===
            Event::JobCreated { job } => {
                self.job_runs
                    .insert(job.run_id.as_str().to_string(), job.clone());
            }
            Event::JobStatusChanged {
                run_id,
                new,
                windmill_job_id,
                result,
                error,
                at_ms,
                previous: _,
            } => {
                if let Some(job) = self.job_runs.get_mut(run_id.as_str()) {
                    job.status = *new;
                    if windmill_job_id.is_some() {
                        job.windmill_job_id = windmill_job_id.clone();
                    }
                    if result.is_some() {
                        job.result = result.clone();
                    }
                    if error.is_some() {
                        job.error = error.clone();
                    }
                    if *new == dg_core::JobStatus::Running && job.started_at_ms.is_none() {
                        job.started_at_ms = Some(*at_ms);
                    }
                    if new.is_terminal() && job.finished_at_ms.is_none() {
                        job.finished_at_ms = Some(*at_ms);
                    }
                }
            }
            Event::StepDispatched { .. } | Event::DispatchFailed { .. } => {
                // Audit-only; the paired job/step events carry the state.
            }

            // === qa ===
            Event::QaEvaluated { result, .. } => {
                self.counters.qa_result = self.counters.qa_result.max(result.id.value());
                self.qa_results.insert(result.id.value(), result.clone());
            }
            Event::FeedbackAutoFixRequested { .. } => {
                // Audit-only; attempt counters travel in StepStatusChanged.
            }

            // === clarification ===
            Event::ClarificationUpserted { clarification } => {
                self.counters.clarification = self
                    .counters
                    .clarification
                    .max(clarification.id.value());
                self.clarifications
                    .insert(clarification.id.value(), clarification.clone());
            }
            Event::ClarificationAnswered {
                clarification_id,
                answer,
                answered_by,
                at_ms,
            } => {
                if let Some(c) = self.clarifications.get_mut(&clarification_id.value()) {
                    c.status = ClarificationStatus::Answered;
                    c.answer = Some(answer.clone());
                    c.answered_by = Some(answered_by.clone());
                    c.updated_at_ms = *at_ms;
                }
            }
            Event::ClarificationDismissed {
                clarification_id,
                at_ms,
            } => {
                if let Some(c) = self.clarifications.get_mut(&clarification_id.value()) {
                    c.status = ClarificationStatus::Dismissed;
                    c.updated_at_ms = *at_ms;
                }
            }

            // === artifact ===
            Event::ArtifactIndexed { artifact } => {
                self.counters.artifact = self.counters.artifact.max(artifact.id.value());
                self.artifacts.insert(artifact.id.value(), artifact.clone());
            }

            // === reconciliation ===
            Event::ReconciliationAutoFix {
                step_run_id,
                new,
                at_ms,
                ..
            } => {
                if let Some(step) = self.step_runs.get_mut(&step_run_id.value()) {
                    step.status = *new;
                    step.updated_at_ms = *at_ms;
                }
            }
            Event::ReconciliationManualRequired { .. } | Event::ReconciliationError { .. } => {
                // Audit-only by design: manual cases must not move state.
            }

            // === webhook ===
            Event::WebhookOrphanJob { .. } | Event::CiEvent { .. } => {
                // Audit-only.
            }

            // === protocol recovery ===
            Event::ProtocolRecovered { .. } => {
                // Audit-only; the recovery emits its own status events.
            }

            // === spec ===
            Event::SpecRunCreated { spec_run } => {
                self.counters.spec_run = self.counters.spec_run.max(spec_run.id.value());
                self.spec_runs.insert(spec_run.id.value(), spec_run.clone());
            }
            Event::SpecRunStatusChanged {
                spec_run_id,
                new,
                at_ms,
                ..
            } => {
                if let Some(spec_run) = self.spec_runs.get_mut(&spec_run_id.value()) {
                    spec_run.status = *new;
                    spec_run.updated_at_ms = *at_ms;
                }
            }

            Event::Custom => {}
        }
    }

    /// Remove a protocol run and everything hanging off it.
    fn remove_protocol_cascade(&mut self, protocol_id: u64) {
        self.protocol_runs.remove(&protocol_id);
        let step_ids: Vec<u64> = self
            .step_runs
            .values()
            .filter(|s| s.protocol_run_id.value() == protocol_id)
            .map(|s| s.id.value())
            .collect();
        for step_id in &step_ids {
            self.step_runs.remove(step_id);
            self.artifacts
                .retain(|_, a| a.step_run_id.map(|s| s.value()) != Some(*step_id));
        }
        self.job_runs
            .retain(|_, j| j.protocol_run_id.map(|p| p.value()) != Some(protocol_id));
        self.clarifications
            .retain(|_, c| c.protocol_run_id.map(|p| p.value()) != Some(protocol_id));
        self.qa_results
            .retain(|_, r| r.protocol_run_id.value() != protocol_id);
    }

    /// Check the referential invariants that must hold after any commit.
    /// Used by tests and the readiness probe.
    pub fn check_invariants(&self) -> Result<(), String> {
        for step in self.step_runs.values() {
            if !self
                .protocol_runs
                .contains_key(&step.protocol_run_id.value())
            {
                return Err(format!(
                    "step {} references missing protocol {}",
                    step.id, step.protocol_run_id
                ));
            }
        }
        for run in self.protocol_runs.values() {
            if !self.projects.contains_key(&run.project_id.value()) {
                return Err(format!(
                    "protocol {} references missing project {}",
                    run.id, run.project_id
                ));
            }
        }
        // step_index unique within a protocol
        for run in self.protocol_runs.values() {
            let steps = self.steps_for_protocol(run.id);
            for pair in steps.windows(2) {
                if pair[0].step_index == pair[1].step_index {
                    return Err(format!(
                        "protocol {} has duplicate step_index {}",
                        run.id, pair[0].step_index
                    ));
                }
            }
        }
        // windmill_job_id unique across job runs
        let mut seen = std::collections::HashSet::new();
        for job in self.job_runs.values() {
            if let Some(ref wid) = job.windmill_job_id {
                if !seen.insert(wid.clone()) {
                    return Err(format!("duplicate windmill_job_id {wid}"));
                }
            }
        }
        // answered clarifications carry their answer
        for c in self.clarifications.values() {
            if !c.invariant_holds() {
                return Err(format!("clarification {} answered without answer", c.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
