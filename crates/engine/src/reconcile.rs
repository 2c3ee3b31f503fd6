// SPDX-License-Identifier: MIT

//! Reconciliation: converge the store with the executor's truth.
//!
//! The store may disagree with the external executor after a lost
//! webhook or a restart mid-dispatch. The engine reads the executor's
//! authoritative job state and fixes what is safe to fix.

use crate::error::OrchestratorError;
use dg_adapters::{ExecutorAdapter, ExternalJobStatus};
use dg_core::{Clock, ProtocolRunId, StepRun, StepStatus};
use dg_storage::Store;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of one step's reconciliation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationAction {
    NoChange,
    AutoFixed,
    ManualRequired,
    Error,
}

impl std::fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReconciliationAction::NoChange => "no_change",
            ReconciliationAction::AutoFixed => "auto_fixed",
            ReconciliationAction::ManualRequired => "manual_required",
            ReconciliationAction::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Per-step reconciliation detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationDetail {
    pub step_run_id: u64,
    pub step_name: String,
    pub protocol_run_id: u64,
    pub db_status: String,
    pub windmill_status: String,
    pub action: ReconciliationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windmill_job_id: Option<String>,
    pub timestamp: String,
}

/// Summary report of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub total_checked: usize,
    pub mismatches_found: usize,
    pub auto_fixed: usize,
    pub requires_manual: usize,
    pub protocols_checked: usize,
    #[serde(default)]
    pub details: Vec<ReconciliationDetail>,
    pub duration_seconds: f64,
    pub timestamp: String,
}

/// Map an external job status to the step status it implies.
pub fn map_external_status(status: ExternalJobStatus) -> StepStatus {
    match status {
        ExternalJobStatus::Queued => StepStatus::Pending,
        ExternalJobStatus::Running => StepStatus::Running,
        ExternalJobStatus::Completed => StepStatus::Completed,
        ExternalJobStatus::Failed => StepStatus::Failed,
        ExternalJobStatus::Cancelled => StepStatus::Cancelled,
        ExternalJobStatus::Unknown => StepStatus::Pending,
    }
}

/// Whether the drift is safe to fix without an operator.
///
/// Never overrule a terminal DB status; always accept a terminal
/// external status; accept the queued->running and running->completed
/// progressions; everything else needs a human.
fn can_auto_fix(db_status: StepStatus, mapped: StepStatus) -> bool {
    if db_status.is_terminal() {
        return false;
    }
    if mapped.is_terminal() {
        return true;
    }
    if db_status == StepStatus::Pending && mapped == StepStatus::Running {
        return true;
    }
    if db_status == StepStatus::Running && mapped == StepStatus::Completed {
        return true;
    }
    false
}

/// Converges step state with the external executor.
pub struct ReconciliationService<C: Clock> {
    store: Arc<Store<C>>,
    executor: Option<Arc<dyn ExecutorAdapter>>,
}

impl<C: Clock> ReconciliationService<C> {
    pub fn new(store: Arc<Store<C>>, executor: Option<Arc<dyn ExecutorAdapter>>) -> Self {
        Self { store, executor }
    }

    fn now_iso() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    fn detail(
        step: &StepRun,
        windmill_status: impl Into<String>,
        action: ReconciliationAction,
        message: Option<String>,
        windmill_job_id: Option<String>,
    ) -> ReconciliationDetail {
        ReconciliationDetail {
            step_run_id: step.id.value(),
            step_name: step.step_name.clone(),
            protocol_run_id: step.protocol_run_id.value(),
            db_status: step.status.to_string(),
            windmill_status: windmill_status.into(),
            action,
            message,
            windmill_job_id,
            timestamp: Self::now_iso(),
        }
    }

    /// Reconcile all active steps (or one protocol's) against the
    /// executor. In dry-run mode, would-be fixes are reported but not
    /// applied.
    pub async fn reconcile_runs(
        &self,
        protocol_run_id: Option<ProtocolRunId>,
        dry_run: bool,
    ) -> Result<ReconciliationReport, OrchestratorError> {
        let start = Instant::now();
        let active_steps = self.store.active_steps(protocol_run_id);

        let mut details = Vec::with_capacity(active_steps.len());
        let mut protocols: HashSet<u64> = HashSet::new();

        for step in &active_steps {
            protocols.insert(step.protocol_run_id.value());
            details.push(self.reconcile_step(step, dry_run).await);
        }

        let auto_fixed = details
            .iter()
            .filter(|d| d.action == ReconciliationAction::AutoFixed)
            .count();
        let requires_manual = details
            .iter()
            .filter(|d| {
                matches!(
                    d.action,
                    ReconciliationAction::ManualRequired | ReconciliationAction::Error
                )
            })
            .count();
        let mismatches_found = auto_fixed + requires_manual;

        let report = ReconciliationReport {
            total_checked: active_steps.len(),
            mismatches_found,
            auto_fixed,
            requires_manual,
            protocols_checked: protocols.len(),
            details,
            duration_seconds: start.elapsed().as_secs_f64(),
            timestamp: Self::now_iso(),
        };

        info!(
            total_checked = report.total_checked,
            mismatches_found = report.mismatches_found,
            auto_fixed = report.auto_fixed,
            requires_manual = report.requires_manual,
            dry_run,
            "reconciliation completed"
        );

        Ok(report)
    }

    /// Reconcile one step by id, regardless of whether it is active.
    /// Terminal steps still go through the can-auto-fix rule, which
    /// refuses to overrule them.
    pub async fn reconcile_single_step(
        &self,
        step_run_id: dg_core::StepRunId,
        dry_run: bool,
    ) -> Result<ReconciliationDetail, OrchestratorError> {
        let step = self.store.get_step_run(step_run_id)?;
        Ok(self.reconcile_step(&step, dry_run).await)
    }

    async fn reconcile_step(&self, step: &StepRun, dry_run: bool) -> ReconciliationDetail {
        let Some(executor) = self.executor.as_ref() else {
            return Self::detail(
                step,
                "unknown",
                ReconciliationAction::Error,
                Some("executor not configured".into()),
                None,
            );
        };

        // Latest dispatch with an external id; steps never dispatched
        // (or dispatched locally) have nothing to reconcile against.
        let windmill_job_id = self
            .store
            .latest_job_for_step(step.id)
            .and_then(|j| j.windmill_job_id);
        let Some(windmill_job_id) = windmill_job_id else {
            return Self::detail(
                step,
                "not_found",
                ReconciliationAction::NoChange,
                Some("no external job found for step".into()),
                None,
            );
        };

        let job = match executor.get_job(&windmill_job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(step = %step.id, job = %windmill_job_id, error = %e, "executor query failed");
                let _ = self.store.record_reconciliation_error(
                    step,
                    Some(windmill_job_id.clone()),
                    e.to_string(),
                );
                return Self::detail(
                    step,
                    "error",
                    ReconciliationAction::Error,
                    Some(format!("failed to query executor: {e}")),
                    Some(windmill_job_id),
                );
            }
        };

        let mapped = map_external_status(job.status);
        if mapped == step.status {
            return Self::detail(
                step,
                job.status.to_string(),
                ReconciliationAction::NoChange,
                None,
                Some(windmill_job_id),
            );
        }

        warn!(
            step = %step.id,
            db_status = %step.status,
            windmill_status = %job.status,
            mapped = %mapped,
            "reconciliation mismatch"
        );

        if !can_auto_fix(step.status, mapped) {
            let _ = self.store.record_reconciliation_manual(
                step,
                job.status.to_string(),
                windmill_job_id.clone(),
            );
            return Self::detail(
                step,
                job.status.to_string(),
                ReconciliationAction::ManualRequired,
                Some(format!(
                    "cannot auto-fix: db={}, external={}",
                    step.status, job.status
                )),
                Some(windmill_job_id),
            );
        }

        if dry_run {
            return Self::detail(
                step,
                job.status.to_string(),
                ReconciliationAction::AutoFixed,
                Some(format!(
                    "[dry run] would update status from {} to {mapped}",
                    step.status
                )),
                Some(windmill_job_id),
            );
        }

        match self.store.record_reconciliation_auto_fix(
            step,
            step.status,
            mapped,
            windmill_job_id.clone(),
        ) {
            Ok(_) => Self::detail(
                step,
                job.status.to_string(),
                ReconciliationAction::AutoFixed,
                Some(format!("updated status from {} to {mapped}", step.status)),
                Some(windmill_job_id),
            ),
            Err(e) => {
                let _ = self.store.record_reconciliation_error(
                    step,
                    Some(windmill_job_id.clone()),
                    e.to_string(),
                );
                Self::detail(
                    step,
                    job.status.to_string(),
                    ReconciliationAction::Error,
                    Some(format!("failed to apply fix: {e}")),
                    Some(windmill_job_id),
                )
            }
        }
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
