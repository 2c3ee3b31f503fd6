// SPDX-License-Identifier: MIT

//! Quality service: composes the gate pipeline with policy resolution,
//! persists results, and maps verdicts onto step/protocol status.

use crate::error::OrchestratorError;
use crate::feedback::FeedbackRouter;
use dg_core::{
    Clock, Finding, Project, ProtocolRun, ProtocolStatus, QaResult, StepRun, StepStatus, Verdict,
};
use dg_quality::{aggregate_verdict, GateContext, GateRegistry};
use dg_storage::{NewQaResult, Store, StepUpdate};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Protocol statuses a QA failure may move to `blocked`.
const PROTOCOL_OPEN: &[ProtocolStatus] = &[
    ProtocolStatus::Pending,
    ProtocolStatus::Planning,
    ProtocolStatus::Planned,
    ProtocolStatus::Running,
    ProtocolStatus::Paused,
    ProtocolStatus::Blocked,
    ProtocolStatus::NeedsQa,
];

/// Evaluates gates for a step and applies the verdict.
pub struct QualityService {
    registry: Arc<RwLock<GateRegistry>>,
    router: FeedbackRouter,
    /// Legacy shortcut: advance `running -> completed` without the
    /// `needs_qa` hop. Configuration, not code paths elsewhere.
    direct_complete: bool,
    /// Global auto-fix budget; projects may override.
    max_auto_fix_attempts: u32,
}

impl QualityService {
    pub fn new(
        registry: Arc<RwLock<GateRegistry>>,
        direct_complete: bool,
        max_auto_fix_attempts: u32,
    ) -> Self {
        Self {
            registry,
            router: FeedbackRouter::new(),
            direct_complete,
            max_auto_fix_attempts,
        }
    }

    /// Gate selection from project policy (`{"gates": [...]}`); the
    /// whole registry otherwise.
    fn selected_gates(&self, project: &Project) -> Option<Vec<String>> {
        project
            .policy_overrides
            .as_ref()?
            .get("gates")?
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
    }

    fn auto_fix_budget(&self, project: &Project) -> u32 {
        project
            .qa_max_auto_fix_attempts()
            .unwrap_or(self.max_auto_fix_attempts)
    }

    /// Status QA evaluation starts from.
    pub fn entry_status(&self) -> StepStatus {
        if self.direct_complete {
            StepStatus::Running
        } else {
            StepStatus::NeedsQa
        }
    }

    /// Evaluate the gate pipeline for a step and drive the verdict into
    /// the store. The step must be in the entry status (`needs_qa`, or
    /// `running` in direct-complete mode).
    ///
    /// Writes exactly one QAResult, then:
    /// - pass/warn/skip: step -> `completed`
    /// - fail with every blocking finding auto-fixable and attempts
    ///   remaining: step back to `running`, `feedback_auto_fix_requested`
    /// - fail/error otherwise: step -> `failed`, protocol -> `blocked`
    pub fn evaluate_step<C: Clock>(
        &self,
        store: &Store<C>,
        step: &StepRun,
        run: &ProtocolRun,
        project: &Project,
    ) -> Result<QaResult, OrchestratorError> {
        let workspace_root = run
            .worktree_path
            .clone()
            .or_else(|| project.local_path.clone())
            .unwrap_or_else(|| std::path::PathBuf::from("."));

        let mut ctx = GateContext::new(workspace_root).with_step(&step.step_name, &step.step_type);
        if let Some(root) = crate::execution::ExecutionService::protocol_root(run, project) {
            ctx = ctx.with_protocol_root(root);
        }

        let start = Instant::now();
        let registry = self.registry.read();
        let gate_results = match self.selected_gates(project) {
            Some(ids) => registry.evaluate_gates(&ids, &ctx),
            None => registry.evaluate_all(&ctx),
        };
        drop(registry);
        let duration_ms = start.elapsed().as_millis() as u64;

        let verdict = aggregate_verdict(&gate_results);
        let findings: Vec<Finding> = gate_results
            .iter()
            .flat_map(|r| r.findings.iter().cloned())
            .collect();

        let result = store.record_qa_evaluated(
            NewQaResult {
                protocol_run_id: run.id,
                project_id: project.id,
                step_run_id: Some(step.id),
                verdict,
                gate_results,
                findings,
            },
            duration_ms,
        )?;

        info!(
            step = %step.id,
            verdict = %verdict,
            findings = result.findings.len(),
            duration_ms,
            "qa evaluated"
        );

        self.apply_verdict(store, step, run, project, &result)?;
        Ok(result)
    }

    fn apply_verdict<C: Clock>(
        &self,
        store: &Store<C>,
        step: &StepRun,
        run: &ProtocolRun,
        project: &Project,
        result: &QaResult,
    ) -> Result<(), OrchestratorError> {
        let entry = self.entry_status();
        match result.verdict {
            Verdict::Pass | Verdict::Warn | Verdict::Skip => {
                let summary = match result.verdict {
                    Verdict::Warn => "QA passed with warnings",
                    Verdict::Skip => "QA skipped",
                    _ => "QA passed",
                };
                store.set_step_status(
                    step.id,
                    &[entry],
                    StepStatus::Completed,
                    StepUpdate {
                        summary: Some(summary.to_string()),
                        ..Default::default()
                    },
                )?;
            }
            Verdict::Fail | Verdict::Error => {
                let attempts = step.auto_fix_attempts();
                let budget = self.auto_fix_budget(project);
                let fixable = result.verdict == Verdict::Fail
                    && self.router.all_blocking_auto_fixable(&result.findings);

                if fixable && attempts < budget {
                    let rule_ids = result
                        .findings
                        .iter()
                        .filter(|f| f.is_blocking())
                        .filter_map(|f| f.rule_id.clone())
                        .collect();
                    store.record_auto_fix_requested(step, attempts + 1, rule_ids)?;
                    store.set_step_status(
                        step.id,
                        &[entry],
                        StepStatus::Running,
                        StepUpdate {
                            reason: Some("auto-fix requested".into()),
                            runtime_state: Some(
                                step.runtime_state_with_incremented("auto_fix_attempts"),
                            ),
                            ..Default::default()
                        },
                    )?;
                } else {
                    store.set_step_status(
                        step.id,
                        &[entry],
                        StepStatus::Failed,
                        StepUpdate {
                            summary: Some(format!(
                                "QA {} with {} finding(s)",
                                result.verdict,
                                result.findings.len()
                            )),
                            ..Default::default()
                        },
                    )?;
                    store.set_protocol_status(
                        run.id,
                        PROTOCOL_OPEN,
                        ProtocolStatus::Blocked,
                        Some("QA failed".into()),
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "quality_tests.rs"]
mod tests;
