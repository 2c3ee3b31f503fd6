// SPDX-License-Identifier: MIT

//! Record builders shared by tests across the workspace.

#![allow(clippy::unwrap_used)]

use crate::artifact::{Artifact, ArtifactId, ArtifactKind};
use crate::clarification::{Clarification, ClarificationId, ClarificationStatus};
use crate::id::RunId;
use crate::job::JobRun;
use crate::project::{Project, ProjectId, ProjectStatus};
use crate::protocol::{ProtocolRun, ProtocolRunId, StepRun, StepRunId};
use crate::qa::{QaResult, QaResultId, Verdict};
use crate::status::{JobStatus, ProtocolStatus, StepStatus};
use std::path::PathBuf;

pub fn project_fixture(id: u64) -> Project {
    Project {
        id: ProjectId::new(id),
        name: format!("project-{id}"),
        git_url: Some(format!("https://example.com/project-{id}.git")),
        base_branch: "main".into(),
        local_path: Some(PathBuf::from(format!("/tmp/project-{id}"))),
        status: ProjectStatus::Active,
        constitution_hash: None,
        policy_overrides: None,
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

pub fn protocol_run_fixture(id: u64, project_id: u64) -> ProtocolRun {
    ProtocolRun {
        id: ProtocolRunId::new(id),
        project_id: ProjectId::new(project_id),
        protocol_name: format!("proto-{id}"),
        status: ProtocolStatus::Pending,
        base_branch: "main".into(),
        worktree_path: None,
        protocol_root: None,
        description: String::new(),
        windmill_flow_id: None,
        template_config: None,
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

pub fn step_run_fixture(id: u64, protocol_run_id: u64, index: u32) -> StepRun {
    StepRun {
        id: StepRunId::new(id),
        protocol_run_id: ProtocolRunId::new(protocol_run_id),
        step_index: index,
        step_name: format!("step-{index}"),
        step_type: "execute".into(),
        status: StepStatus::Pending,
        priority: 0,
        assigned_agent: None,
        model: None,
        summary: None,
        runtime_state: None,
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

pub fn job_run_fixture(run_id: &str, step: &StepRun) -> JobRun {
    JobRun {
        run_id: RunId::new(run_id),
        job_type: "execute_step".into(),
        status: JobStatus::Queued,
        project_id: None,
        protocol_run_id: Some(step.protocol_run_id),
        step_run_id: Some(step.id),
        windmill_job_id: None,
        params: serde_json::json!({}),
        result: None,
        error: None,
        log_path: None,
        created_at_ms: 1,
        started_at_ms: None,
        finished_at_ms: None,
    }
}

pub fn qa_result_fixture(id: u64, step: &StepRun, project_id: u64, verdict: Verdict) -> QaResult {
    QaResult {
        id: QaResultId::new(id),
        protocol_run_id: step.protocol_run_id,
        project_id: ProjectId::new(project_id),
        step_run_id: Some(step.id),
        verdict,
        gate_results: Vec::new(),
        findings: Vec::new(),
        created_at_ms: 1,
    }
}

pub fn clarification_fixture(id: u64, project_id: u64, scope: &str, key: &str) -> Clarification {
    Clarification {
        id: ClarificationId::new(id),
        scope: scope.into(),
        project_id: ProjectId::new(project_id),
        protocol_run_id: None,
        step_run_id: None,
        key: key.into(),
        question: "?".into(),
        recommended: None,
        options: Vec::new(),
        applies_to: "execution".into(),
        blocking: true,
        status: ClarificationStatus::Open,
        answer: None,
        answered_by: None,
        created_at_ms: 1,
        updated_at_ms: 1,
    }
}

pub fn artifact_fixture(id: u64, name: &str) -> Artifact {
    Artifact {
        id: ArtifactId::new(id),
        run_id: None,
        step_run_id: None,
        name: name.into(),
        kind: ArtifactKind::from_name(name),
        path: PathBuf::from(format!("/tmp/artifacts/{name}")),
        bytes: None,
        created_at_ms: 1,
    }
}
