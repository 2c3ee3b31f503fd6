// SPDX-License-Identifier: MIT

//! Event types for the DevGodzilla system.
//!
//! Events are facts appended to the durable log; materialized state is
//! derived from them. Creation events carry the full record payload so
//! log replay can rebuild state with no other source of truth.
//!
//! Serializes with `{"type": "event_name", ...fields}`. Unknown type tags
//! deserialize to `Custom` so old daemons can tail newer logs.

use crate::artifact::Artifact;
use crate::clarification::{Clarification, ClarificationId};
use crate::id::RunId;
use crate::job::JobRun;
use crate::project::{Project, ProjectId};
use crate::protocol::{ProtocolRun, ProtocolRunId, StepRun, StepRunId};
use crate::qa::QaResult;
use crate::spec_run::{SpecRun, SpecRunId, SpecRunStatus};
use crate::status::{JobStatus, ProtocolStatus, StepStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a step's work is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// In-process execution through the engine adapter.
    Local,
    /// Submission to the external executor.
    External,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Local => write!(f, "local"),
            DispatchMode::External => write!(f, "external"),
        }
    }
}

/// Action taken by stuck-protocol recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Completed,
    Blocked,
    EnqueuedStep,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryAction::Completed => write!(f, "completed"),
            RecoveryAction::Blocked => write!(f, "blocked"),
            RecoveryAction::EnqueuedStep => write!(f, "enqueued_step"),
        }
    }
}

/// Coarse event grouping used for stream filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Project,
    Protocol,
    Step,
    Job,
    Qa,
    Clarification,
    Artifact,
    Reconciliation,
    Webhook,
    Spec,
    System,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventCategory::Project => "project",
            EventCategory::Protocol => "protocol",
            EventCategory::Step => "step",
            EventCategory::Job => "job",
            EventCategory::Qa => "qa",
            EventCategory::Clarification => "clarification",
            EventCategory::Artifact => "artifact",
            EventCategory::Reconciliation => "reconciliation",
            EventCategory::Webhook => "webhook",
            EventCategory::Spec => "spec",
            EventCategory::System => "system",
        };
        write!(f, "{s}")
    }
}

/// Events recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- project --
    #[serde(rename = "project_created")]
    ProjectCreated { project: Project },

    #[serde(rename = "project_updated")]
    ProjectUpdated { project: Project },

    #[serde(rename = "project_archived")]
    ProjectArchived { project_id: ProjectId, at_ms: u64 },

    #[serde(rename = "project_unarchived")]
    ProjectUnarchived { project_id: ProjectId, at_ms: u64 },

    /// Hard deletion; cascades to everything owned by the project.
    #[serde(rename = "project_deleted")]
    ProjectDeleted { project_id: ProjectId, at_ms: u64 },

    // -- protocol --
    #[serde(rename = "protocol_created")]
    ProtocolCreated { run: ProtocolRun },

    /// Non-status fields changed (worktree, protocol root, flow id).
    #[serde(rename = "protocol_updated")]
    ProtocolUpdated { run: ProtocolRun },

    #[serde(rename = "protocol_status_changed")]
    ProtocolStatusChanged {
        protocol_run_id: ProtocolRunId,
        project_id: ProjectId,
        previous: ProtocolStatus,
        new: ProtocolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        at_ms: u64,
    },

    #[serde(rename = "protocol_recovered")]
    ProtocolRecovered {
        protocol_run_id: ProtocolRunId,
        action: RecoveryAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_run_id: Option<StepRunId>,
        at_ms: u64,
    },

    // -- step --
    #[serde(rename = "step_created")]
    StepCreated { step: StepRun },

    #[serde(rename = "step_status_changed")]
    StepStatusChanged {
        step_run_id: StepRunId,
        protocol_run_id: ProtocolRunId,
        previous: StepStatus,
        new: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        /// Replacement runtime_state, when the transition also updates
        /// counters (retries, auto-fix attempts).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runtime_state: Option<serde_json::Value>,
        at_ms: u64,
    },

    #[serde(rename = "step_dispatched")]
    StepDispatched {
        step_run_id: StepRunId,
        protocol_run_id: ProtocolRunId,
        run_id: RunId,
        mode: DispatchMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        windmill_job_id: Option<String>,
        at_ms: u64,
    },

    #[serde(rename = "dispatch_failed")]
    DispatchFailed {
        step_run_id: StepRunId,
        protocol_run_id: ProtocolRunId,
        run_id: RunId,
        error: String,
        at_ms: u64,
    },

    // -- job --
    #[serde(rename = "job_created")]
    JobCreated { job: JobRun },

    #[serde(rename = "job_status_changed")]
    JobStatusChanged {
        run_id: RunId,
        previous: JobStatus,
        new: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        windmill_job_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at_ms: u64,
    },

    // -- qa --
    #[serde(rename = "qa_evaluated")]
    QaEvaluated { result: QaResult, duration_ms: u64 },

    #[serde(rename = "feedback_auto_fix_requested")]
    FeedbackAutoFixRequested {
        step_run_id: StepRunId,
        protocol_run_id: ProtocolRunId,
        attempt: u32,
        #[serde(default)]
        rule_ids: Vec<String>,
        at_ms: u64,
    },

    // -- clarification --
    #[serde(rename = "clarification_upserted")]
    ClarificationUpserted { clarification: Clarification },

    #[serde(rename = "clarification_answered")]
    ClarificationAnswered {
        clarification_id: ClarificationId,
        answer: String,
        answered_by: String,
        at_ms: u64,
    },

    #[serde(rename = "clarification_dismissed")]
    ClarificationDismissed {
        clarification_id: ClarificationId,
        at_ms: u64,
    },

    // -- artifact --
    #[serde(rename = "artifact_indexed")]
    ArtifactIndexed { artifact: Artifact },

    // -- reconciliation --
    /// Drift fixed from the executor's authoritative state. Applying this
    /// event IS the step status change; no separate status event is
    /// emitted for the same fix.
    #[serde(rename = "reconciliation_auto_fix")]
    ReconciliationAutoFix {
        step_run_id: StepRunId,
        protocol_run_id: ProtocolRunId,
        previous: StepStatus,
        new: StepStatus,
        windmill_job_id: String,
        at_ms: u64,
    },

    #[serde(rename = "reconciliation_manual_required")]
    ReconciliationManualRequired {
        step_run_id: StepRunId,
        protocol_run_id: ProtocolRunId,
        db_status: StepStatus,
        windmill_status: String,
        windmill_job_id: String,
        at_ms: u64,
    },

    #[serde(rename = "reconciliation_error")]
    ReconciliationError {
        step_run_id: StepRunId,
        protocol_run_id: ProtocolRunId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        windmill_job_id: Option<String>,
        error: String,
        at_ms: u64,
    },

    // -- webhook --
    /// Delivery referenced a job id the store does not know. Swallowed
    /// for delivery safety, recorded for diagnostics.
    #[serde(rename = "webhook_orphan_job")]
    WebhookOrphanJob {
        windmill_job_id: String,
        status: String,
        at_ms: u64,
    },

    #[serde(rename = "ci_event")]
    CiEvent {
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<ProjectId>,
        repo_url: String,
        summary: String,
        at_ms: u64,
    },

    // -- spec --
    #[serde(rename = "spec_run_created")]
    SpecRunCreated { spec_run: SpecRun },

    #[serde(rename = "spec_run_status_changed")]
    SpecRunStatusChanged {
        spec_run_id: SpecRunId,
        previous: SpecRunStatus,
        new: SpecRunStatus,
        at_ms: u64,
    },

    /// Catch-all for unknown event types (forward compatibility).
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ProjectCreated { .. } => "project_created",
            Event::ProjectUpdated { .. } => "project_updated",
            Event::ProjectArchived { .. } => "project_archived",
            Event::ProjectUnarchived { .. } => "project_unarchived",
            Event::ProjectDeleted { .. } => "project_deleted",
            Event::ProtocolCreated { .. } => "protocol_created",
            Event::ProtocolUpdated { .. } => "protocol_updated",
            Event::ProtocolStatusChanged { .. } => "protocol_status_changed",
            Event::ProtocolRecovered { .. } => "protocol_recovered",
            Event::StepCreated { .. } => "step_created",
            Event::StepStatusChanged { .. } => "step_status_changed",
            Event::StepDispatched { .. } => "step_dispatched",
            Event::DispatchFailed { .. } => "dispatch_failed",
            Event::JobCreated { .. } => "job_created",
            Event::JobStatusChanged { .. } => "job_status_changed",
            Event::QaEvaluated { .. } => "qa_evaluated",
            Event::FeedbackAutoFixRequested { .. } => "feedback_auto_fix_requested",
            Event::ClarificationUpserted { .. } => "clarification_upserted",
            Event::ClarificationAnswered { .. } => "clarification_answered",
            Event::ClarificationDismissed { .. } => "clarification_dismissed",
            Event::ArtifactIndexed { .. } => "artifact_indexed",
            Event::ReconciliationAutoFix { .. } => "reconciliation_auto_fix",
            Event::ReconciliationManualRequired { .. } => "reconciliation_manual_required",
            Event::ReconciliationError { .. } => "reconciliation_error",
            Event::WebhookOrphanJob { .. } => "webhook_orphan_job",
            Event::CiEvent { .. } => "ci_event",
            Event::SpecRunCreated { .. } => "spec_run_created",
            Event::SpecRunStatusChanged { .. } => "spec_run_status_changed",
            Event::Custom => "custom",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Event::ProjectCreated { .. }
            | Event::ProjectUpdated { .. }
            | Event::ProjectArchived { .. }
            | Event::ProjectUnarchived { .. }
            | Event::ProjectDeleted { .. } => EventCategory::Project,
            Event::ProtocolCreated { .. }
            | Event::ProtocolUpdated { .. }
            | Event::ProtocolStatusChanged { .. }
            | Event::ProtocolRecovered { .. } => EventCategory::Protocol,
            Event::StepCreated { .. }
            | Event::StepStatusChanged { .. }
            | Event::StepDispatched { .. }
            | Event::DispatchFailed { .. } => EventCategory::Step,
            Event::JobCreated { .. } | Event::JobStatusChanged { .. } => EventCategory::Job,
            Event::QaEvaluated { .. } | Event::FeedbackAutoFixRequested { .. } => EventCategory::Qa,
            Event::ClarificationUpserted { .. }
            | Event::ClarificationAnswered { .. }
            | Event::ClarificationDismissed { .. } => EventCategory::Clarification,
            Event::ArtifactIndexed { .. } => EventCategory::Artifact,
            Event::ReconciliationAutoFix { .. }
            | Event::ReconciliationManualRequired { .. }
            | Event::ReconciliationError { .. } => EventCategory::Reconciliation,
            Event::WebhookOrphanJob { .. } | Event::CiEvent { .. } => EventCategory::Webhook,
            Event::SpecRunCreated { .. } | Event::SpecRunStatusChanged { .. } => EventCategory::Spec,
            Event::Custom => EventCategory::System,
        }
    }

    pub fn project_id(&self) -> Option<ProjectId> {
        match self {
            Event::ProjectCreated { project } | Event::ProjectUpdated { project } => {
                Some(project.id)
            }
            Event::ProjectArchived { project_id, .. }
            | Event::ProjectUnarchived { project_id, .. }
            | Event::ProjectDeleted { project_id, .. } => Some(*project_id),
            Event::ProtocolCreated { run } | Event::ProtocolUpdated { run } => {
                Some(run.project_id)
            }
            Event::ProtocolStatusChanged { project_id, .. } => Some(*project_id),
            Event::QaEvaluated { result, .. } => Some(result.project_id),
            Event::ClarificationUpserted { clarification } => Some(clarification.project_id),
            Event::CiEvent { project_id, .. } => *project_id,
            Event::SpecRunCreated { spec_run } => Some(spec_run.project_id),
            Event::JobCreated { job } => job.project_id,
            _ => None,
        }
    }

    pub fn protocol_run_id(&self) -> Option<ProtocolRunId> {
        match self {
            Event::ProtocolCreated { run } | Event::ProtocolUpdated { run } => Some(run.id),
            Event::ProtocolStatusChanged {
                protocol_run_id, ..
            }
            | Event::ProtocolRecovered {
                protocol_run_id, ..
            }
            | Event::StepStatusChanged {
                protocol_run_id, ..
            }
            | Event::StepDispatched {
                protocol_run_id, ..
            }
            | Event::DispatchFailed {
                protocol_run_id, ..
            }
            | Event::FeedbackAutoFixRequested {
                protocol_run_id, ..
            }
            | Event::ReconciliationAutoFix {
                protocol_run_id, ..
            }
            | Event::ReconciliationManualRequired {
                protocol_run_id, ..
            }
            | Event::ReconciliationError {
                protocol_run_id, ..
            } => Some(*protocol_run_id),
            Event::StepCreated { step } => Some(step.protocol_run_id),
            Event::JobCreated { job } => job.protocol_run_id,
            Event::QaEvaluated { result, .. } => Some(result.protocol_run_id),
            Event::ClarificationUpserted { clarification } => clarification.protocol_run_id,
            _ => None,
        }
    }

    pub fn step_run_id(&self) -> Option<StepRunId> {
        match self {
            Event::StepCreated { step } => Some(step.id),
            Event::StepStatusChanged { step_run_id, .. }
            | Event::StepDispatched { step_run_id, .. }
            | Event::DispatchFailed { step_run_id, .. }
            | Event::FeedbackAutoFixRequested { step_run_id, .. }
            | Event::ReconciliationAutoFix { step_run_id, .. }
            | Event::ReconciliationManualRequired { step_run_id, .. }
            | Event::ReconciliationError { step_run_id, .. } => Some(*step_run_id),
            Event::ProtocolRecovered { step_run_id, .. } => *step_run_id,
            Event::JobCreated { job } => job.step_run_id,
            Event::QaEvaluated { result, .. } => result.step_run_id,
            Event::ClarificationUpserted { clarification } => clarification.step_run_id,
            Event::ArtifactIndexed { artifact } => artifact.step_run_id,
            _ => None,
        }
    }

    /// One-line summary for the daemon log.
    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::ProjectCreated { project } | Event::ProjectUpdated { project } => {
                format!("{t} id={} name={}", project.id, project.name)
            }
            Event::ProjectArchived { project_id, .. }
            | Event::ProjectUnarchived { project_id, .. }
            | Event::ProjectDeleted { project_id, .. } => format!("{t} id={project_id}"),
            Event::ProtocolCreated { run } | Event::ProtocolUpdated { run } => {
                format!("{t} id={} name={}", run.id, run.protocol_name)
            }
            Event::ProtocolStatusChanged {
                protocol_run_id,
                previous,
                new,
                ..
            } => format!("{t} id={protocol_run_id} {previous}->{new}"),
            Event::ProtocolRecovered {
                protocol_run_id,
                action,
                ..
            } => format!("{t} id={protocol_run_id} action={action}"),
            Event::StepCreated { step } => {
                format!(
                    "{t} id={} protocol={} index={} name={}",
                    step.id, step.protocol_run_id, step.step_index, step.step_name
                )
            }
            Event::StepStatusChanged {
                step_run_id,
                previous,
                new,
                ..
            } => format!("{t} id={step_run_id} {previous}->{new}"),
            Event::StepDispatched {
                step_run_id,
                run_id,
                mode,
                ..
            } => format!("{t} id={step_run_id} run={run_id} mode={mode}"),
            Event::DispatchFailed {
                step_run_id, error, ..
            } => format!("{t} id={step_run_id} error={error}"),
            Event::JobCreated { job } => {
                format!("{t} run={} type={}", job.run_id, job.job_type)
            }
            Event::JobStatusChanged {
                run_id,
                previous,
                new,
                ..
            } => format!("{t} run={run_id} {previous}->{new}"),
            Event::QaEvaluated {
                result,
                duration_ms,
            } => format!(
                "{t} step={:?} verdict={} findings={} duration_ms={duration_ms}",
                result.step_run_id.map(|s| s.value()),
                result.verdict,
                result.findings.len()
            ),
            Event::FeedbackAutoFixRequested {
                step_run_id,
                attempt,
                ..
            } => format!("{t} step={step_run_id} attempt={attempt}"),
            Event::ClarificationUpserted { clarification } => format!(
                "{t} id={} scope={} key={}",
                clarification.id, clarification.scope, clarification.key
            ),
            Event::ClarificationAnswered {
                clarification_id, ..
            } => format!("{t} id={clarification_id}"),
            Event::ClarificationDismissed {
                clarification_id, ..
            } => format!("{t} id={clarification_id}"),
            Event::ArtifactIndexed { artifact } => {
                format!("{t} id={} name={}", artifact.id, artifact.name)
            }
            Event::ReconciliationAutoFix {
                step_run_id,
                previous,
                new,
                windmill_job_id,
                ..
            } => format!("{t} step={step_run_id} {previous}->{new} job={windmill_job_id}"),
            Event::ReconciliationManualRequired {
                step_run_id,
                db_status,
                windmill_status,
                ..
            } => format!("{t} step={step_run_id} db={db_status} external={windmill_status}"),
            Event::ReconciliationError {
                step_run_id, error, ..
            } => format!("{t} step={step_run_id} error={error}"),
            Event::WebhookOrphanJob {
                windmill_job_id,
                status,
                ..
            } => format!("{t} job={windmill_job_id} status={status}"),
            Event::CiEvent {
                provider, repo_url, ..
            } => format!("{t} provider={provider} repo={repo_url}"),
            Event::SpecRunCreated { spec_run } => {
                format!("{t} id={} name={}", spec_run.id, spec_run.spec_name)
            }
            Event::SpecRunStatusChanged {
                spec_run_id,
                previous,
                new,
                ..
            } => format!("{t} id={spec_run_id} {previous}->{new}"),
            Event::Custom => t.to_string(),
        }
    }
}

/// A committed event with its log-assigned id.
///
/// Ids are strictly monotonic per store and never reused; SSE consumers
/// resume from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub ts_ms: u64,
    pub event: Event,
}

/// Filter for event reads (SSE and `/events/recent`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_run_id: Option<ProtocolRunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(project_id) = self.project_id {
            if event.project_id() != Some(project_id) {
                return false;
            }
        }
        if let Some(protocol_run_id) = self.protocol_run_id {
            if event.protocol_run_id() != Some(protocol_run_id) {
                return false;
            }
        }
        if let Some(ref event_type) = self.event_type {
            if event.name() != event_type {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category() != category {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
