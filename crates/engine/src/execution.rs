// SPDX-License-Identifier: MIT

//! Step execution: engine resolution, prompt assembly, invocation,
//! capture, and block detection.

use crate::error::OrchestratorError;
use dg_adapters::engine::{Engine as _, EngineRegistry, EngineRequest, FALLBACK_ENGINE_ID};
use dg_core::{Clock, JobRun, Project, ProtocolRun, StepRun};
use dg_storage::{NewArtifact, Store, StoreError};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stdout markers that mean the agent stopped for missing input.
const BLOCK_PATTERNS: &[&str] = &[
    "clarification needed",
    "clarification requested",
    "needs clarification",
    "missing information",
    "cannot proceed without",
    "i cannot assist",
    "policy refusal",
];

/// Result of one step execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub engine_id: String,
    pub stdout: String,
    pub stderr: String,
    pub artifacts: Vec<dg_core::Artifact>,
    pub error: Option<String>,
    /// Matched block line, when the agent asked for input.
    pub blocked: Option<String>,
    pub timed_out: bool,
}

/// Drives engines against step prompts.
pub struct ExecutionService {
    engines: Arc<RwLock<EngineRegistry>>,
    logs_dir: PathBuf,
    default_engine_id: Option<String>,
    engine_timeout: Duration,
}

impl ExecutionService {
    pub fn new(
        engines: Arc<RwLock<EngineRegistry>>,
        logs_dir: PathBuf,
        default_engine_id: Option<String>,
        engine_timeout: Duration,
    ) -> Self {
        Self {
            engines,
            logs_dir,
            default_engine_id,
            engine_timeout,
        }
    }

    /// Stage key for project-level engine defaults.
    fn stage_for(step_type: &str) -> &'static str {
        match step_type {
            "plan" => "planning",
            "qa" => "qa",
            "pr" => "pr",
            _ => "code_gen",
        }
    }

    /// Resolve the engine id: explicit argument, step assignment,
    /// project default for the stage, global default, hard fallback.
    pub fn resolve_engine_id(
        &self,
        explicit: Option<&str>,
        step: &StepRun,
        project: &Project,
    ) -> String {
        if let Some(id) = explicit {
            return id.to_string();
        }
        if let Some(ref id) = step.assigned_agent {
            return id.clone();
        }
        if let Some(id) = project.engine_default_for(Self::stage_for(&step.step_type)) {
            return id;
        }
        if let Some(ref id) = self.default_engine_id {
            return id.clone();
        }
        FALLBACK_ENGINE_ID.to_string()
    }

    /// Protocol root: the run's recorded root, else the conventional
    /// location under the project checkout.
    pub fn protocol_root(run: &ProtocolRun, project: &Project) -> Option<PathBuf> {
        run.protocol_root.clone().or_else(|| {
            project
                .local_path
                .as_ref()
                .map(|p| p.join(".protocols").join(&run.protocol_name))
        })
    }

    /// Assemble the prompt: the step file under the protocol root,
    /// optionally prefixed by the project's template for the step type.
    /// Falls back to the step summary when no file exists.
    fn resolve_prompt(step: &StepRun, run: &ProtocolRun, project: &Project) -> String {
        let mut sections: Vec<String> = Vec::new();

        if let Some(template_rel) = project
            .policy_overrides
            .as_ref()
            .and_then(|p| p.get("prompt_templates"))
            .and_then(|t| t.get(&step.step_type))
            .and_then(|v| v.as_str())
        {
            if let Some(repo) = project.local_path.as_ref() {
                if let Ok(template) = std::fs::read_to_string(repo.join(template_rel)) {
                    sections.push(template.trim_end().to_string());
                }
            }
        }

        let step_file = Self::protocol_root(run, project)
            .map(|root| root.join(step.prompt_file_name()));
        let body = step_file
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok());
        match body {
            Some(text) => sections.push(text.trim_end().to_string()),
            None => {
                debug!(step = %step.id, file = ?step_file, "no step file, using summary prompt");
                let mut fallback = step.step_name.clone();
                if let Some(ref summary) = step.summary {
                    fallback.push_str("\n\n");
                    fallback.push_str(summary);
                } else if !run.description.is_empty() {
                    fallback.push_str("\n\n");
                    fallback.push_str(&run.description);
                }
                sections.push(fallback);
            }
        }

        sections.join("\n\n")
    }

    fn working_dir(run: &ProtocolRun, project: &Project) -> PathBuf {
        run.worktree_path
            .clone()
            .or_else(|| project.local_path.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn find_block_line(stdout: &str) -> Option<String> {
        for line in stdout.lines() {
            let lower = line.to_lowercase();
            if BLOCK_PATTERNS.iter().any(|p| lower.contains(p)) {
                return Some(line.trim().to_string());
            }
        }
        None
    }

    /// Write captured output to the job's log file.
    fn write_log(&self, job: &JobRun, stdout: &str, stderr: &str) -> Result<PathBuf, StoreError> {
        let path = job
            .log_path
            .clone()
            .unwrap_or_else(|| self.run_log_path(job.run_id.as_str()));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Validation(e.to_string()))?;
        }
        let mut content = String::with_capacity(stdout.len() + stderr.len() + 16);
        content.push_str(stdout);
        if !stderr.is_empty() {
            content.push_str("\n--- stderr ---\n");
            content.push_str(stderr);
        }
        std::fs::write(&path, content).map_err(|e| StoreError::Validation(e.to_string()))?;
        Ok(path)
    }

    /// Conventional log location for a run id.
    pub fn run_log_path(&self, run_id: &str) -> PathBuf {
        self.logs_dir.join("runs").join(format!("{run_id}.log"))
    }

    /// Directory where a step's extra artifacts land.
    pub fn step_artifacts_dir(protocol_root: &Path, step: &StepRun) -> PathBuf {
        protocol_root
            .join(".devgodzilla")
            .join("steps")
            .join(step.id.to_string())
            .join("artifacts")
    }

    /// Index the log file plus any files the agent left under the
    /// step's artifact directory.
    fn index_artifacts<C: Clock>(
        &self,
        store: &Store<C>,
        step: &StepRun,
        run: &ProtocolRun,
        project: &Project,
        job: &JobRun,
        log_path: &Path,
    ) -> Vec<dg_core::Artifact> {
        let mut artifacts = Vec::new();

        let log_bytes = std::fs::metadata(log_path).map(|m| m.len()).ok();
        match store.index_artifact(NewArtifact {
            run_id: Some(job.run_id.clone()),
            step_run_id: Some(step.id),
            name: format!("{}.log", job.run_id),
            kind: Some(dg_core::ArtifactKind::Log),
            path: log_path.to_path_buf(),
            bytes: log_bytes,
        }) {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => warn!(error = %e, "failed to index log artifact"),
        }

        let Some(root) = Self::protocol_root(run, project) else {
            return artifacts;
        };
        let dir = Self::step_artifacts_dir(&root, step);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return artifacts;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let bytes = entry.metadata().map(|m| m.len()).ok();
            match store.index_artifact(NewArtifact {
                run_id: Some(job.run_id.clone()),
                step_run_id: Some(step.id),
                name,
                kind: None,
                path,
                bytes,
            }) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => warn!(error = %e, "failed to index step artifact"),
            }
        }
        artifacts
    }

    /// Execute one step via its resolved engine.
    ///
    /// The outcome reports block detection and timeouts as data; the
    /// caller owns the resulting status transitions. An unavailable
    /// engine is the one hard error here.
    pub async fn execute_step<C: Clock>(
        &self,
        store: &Store<C>,
        step: &StepRun,
        run: &ProtocolRun,
        project: &Project,
        job: &JobRun,
        engine_id: Option<&str>,
        model: Option<&str>,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        let engine_id = self.resolve_engine_id(engine_id, step, project);
        let engine = self
            .engines
            .read()
            .get(&engine_id)
            .ok_or_else(|| {
                OrchestratorError::AgentUnavailable(format!("engine '{engine_id}' not registered"))
            })?;

        if !engine.check_availability().await {
            return Err(OrchestratorError::AgentUnavailable(format!(
                "engine '{engine_id}' is not available"
            )));
        }

        let prompt = Self::resolve_prompt(step, run, project);
        let working_dir = Self::working_dir(run, project);
        let model = model
            .map(str::to_string)
            .or_else(|| step.model.clone());

        info!(
            step = %step.id,
            engine = %engine_id,
            cwd = %working_dir.display(),
            prompt_len = prompt.len(),
            "executing step"
        );

        let request = EngineRequest {
            prompt,
            working_dir,
            model,
            env: vec![
                ("DEVGODZILLA_STEP_ID".into(), step.id.to_string()),
                ("DEVGODZILLA_PROTOCOL_RUN_ID".into(), run.id.to_string()),
            ],
            timeout: self.engine_timeout,
        };

        let response = match engine.execute(request).await {
            Ok(response) => response,
            Err(dg_adapters::EngineError::Timeout(secs)) => {
                let log_path = self.write_log(job, "", "execution timed out")?;
                let artifacts = self.index_artifacts(store, step, run, project, job, &log_path);
                return Ok(ExecutionOutcome {
                    success: false,
                    engine_id,
                    stdout: String::new(),
                    stderr: String::new(),
                    artifacts,
                    error: Some(format!("timed out after {secs}s")),
                    blocked: None,
                    timed_out: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let log_path = self.write_log(job, &response.stdout, &response.stderr)?;
        let artifacts = self.index_artifacts(store, step, run, project, job, &log_path);
        let blocked = Self::find_block_line(&response.stdout);
        let success = response.success() && blocked.is_none();
        let error = if response.success() {
            None
        } else {
            let tail: String = response
                .stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            Some(if tail.is_empty() {
                format!("engine exited with code {}", response.exit_code)
            } else {
                tail
            })
        };

        Ok(ExecutionOutcome {
            success,
            engine_id,
            stdout: response.stdout,
            stderr: response.stderr,
            artifacts,
            error,
            blocked,
            timed_out: false,
        })
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
