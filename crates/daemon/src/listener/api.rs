// SPDX-License-Identifier: MIT

//! Request dispatch: the operation surface an HTTP facade translates
//! its routes onto.

use crate::health::HealthChecker;
use crate::logs::read_log_tail;
use crate::protocol::{
    ErrorKind, ProtocolAction, ProtocolDetail, Request, Response, StepAction, PROTOCOL_VERSION,
};
use crate::webhooks::{apply_ci_webhook, apply_windmill_webhook};
use dg_core::{
    ClarificationId, Clock, EventCategory, EventFilter, ProjectId, ProtocolRunId, RunId,
    StepRunId,
};
use dg_engine::{
    Orchestrator, OrchestratorError, ReconciliationReport, ReconciliationService,
};
use dg_storage::{NewProject, NewProtocolRun, ProjectUpdate, StoreError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// The daemon's request handler.
pub struct Api<C: Clock> {
    pub orchestrator: Orchestrator<C>,
    pub reconciliation: Arc<ReconciliationService<C>>,
    pub health: Arc<HealthChecker<C>>,
    /// Last reconciliation report, for `GET /reconciliation/status`.
    pub last_report: Arc<Mutex<Option<ReconciliationReport>>>,
}

fn error_response(e: OrchestratorError) -> Response {
    let kind = match &e {
        OrchestratorError::Store(StoreError::InvalidTransition(_)) => ErrorKind::InvalidTransition,
        OrchestratorError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
        OrchestratorError::Store(StoreError::Validation(_))
        | OrchestratorError::Store(StoreError::Conflict(_)) => ErrorKind::Validation,
        OrchestratorError::Store(_) => ErrorKind::Internal,
        OrchestratorError::AgentUnavailable(_) => ErrorKind::AgentUnavailable,
        OrchestratorError::ExecutionBlocked(_) => ErrorKind::ExecutionBlocked,
        OrchestratorError::Timeout(_) => ErrorKind::Timeout,
        OrchestratorError::Transient(_) => ErrorKind::Transient,
        OrchestratorError::Executor(_) => ErrorKind::ExternalExecutor,
        OrchestratorError::Configuration(_) => ErrorKind::Configuration,
    };
    Response::Error {
        kind,
        message: e.to_string(),
    }
}

fn store_error(e: StoreError) -> Response {
    error_response(OrchestratorError::Store(e))
}

fn parse_category(category: Option<String>) -> Option<EventCategory> {
    let category = category?;
    serde_json::from_value(serde_json::Value::String(category)).ok()
}

impl<C: Clock> Api<C> {
    pub async fn handle(&self, request: Request) -> Response {
        let store = self.orchestrator.store();
        match request {
            Request::Ping => Response::Pong,
            Request::Hello { .. } => Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            },
            Request::Ready => Response::Ready(self.health.readiness().await),
            Request::Shutdown => Response::ShuttingDown,

            // -- projects --
            Request::CreateProject {
                name,
                git_url,
                base_branch,
                local_path,
                policy_overrides,
            } => match store.create_project(NewProject {
                name,
                git_url,
                base_branch,
                local_path: local_path.map(PathBuf::from),
                policy_overrides,
            }) {
                Ok(project) => Response::Project { project },
                Err(e) => store_error(e),
            },
            Request::ListProjects { status } => Response::Projects {
                projects: store.list_projects(status),
            },
            Request::GetProject { id } => match store.get_project(ProjectId::new(id)) {
                Ok(project) => Response::Project { project },
                Err(e) => store_error(e),
            },
            Request::UpdateProject {
                id,
                name,
                git_url,
                base_branch,
                local_path,
                policy_overrides,
            } => match store.update_project(
                ProjectId::new(id),
                ProjectUpdate {
                    name,
                    git_url,
                    base_branch,
                    local_path: local_path.map(PathBuf::from),
                    constitution_hash: None,
                    policy_overrides,
                },
            ) {
                Ok(project) => Response::Project { project },
                Err(e) => store_error(e),
            },
            Request::DeleteProject { id } => match store.delete_project(ProjectId::new(id)) {
                Ok(()) => Response::Ok,
                Err(e) => store_error(e),
            },
            Request::ArchiveProject { id } => match store.archive_project(ProjectId::new(id)) {
                Ok(project) => Response::Project { project },
                Err(e) => store_error(e),
            },
            Request::UnarchiveProject { id } => {
                match store.unarchive_project(ProjectId::new(id)) {
                    Ok(project) => Response::Project { project },
                    Err(e) => store_error(e),
                }
            }

            // -- protocols --
            Request::CreateProtocol {
                project_id,
                protocol_name,
                base_branch,
                description,
                template_config,
            } => {
                let new = NewProtocolRun {
                    project_id: ProjectId::new(project_id),
                    protocol_name,
                    base_branch,
                    description,
                    windmill_flow_id: None,
                    template_config,
                };
                match self.orchestrator.create_protocol_run(new) {
                    Ok((run, steps)) => Response::Protocol {
                        detail: ProtocolDetail { run, steps },
                    },
                    Err(e) => error_response(e),
                }
            }
            Request::ListProtocols { project_id, limit } => Response::Protocols {
                protocols: store.list_protocol_runs(project_id.map(ProjectId::new), limit),
            },
            Request::GetProtocol { id } => {
                let id = ProtocolRunId::new(id);
                match store.get_protocol_run(id) {
                    Ok(run) => Response::Protocol {
                        detail: ProtocolDetail {
                            steps: store.steps_for_protocol(id),
                            run,
                        },
                    },
                    Err(e) => store_error(e),
                }
            }
            Request::ProtocolAction { id, action } => {
                let id = ProtocolRunId::new(id);
                let result = match action {
                    ProtocolAction::Start => self.orchestrator.start_protocol(id),
                    ProtocolAction::Pause => self.orchestrator.pause_protocol(id),
                    ProtocolAction::Resume => self.orchestrator.resume_protocol(id),
                    ProtocolAction::Cancel => self.orchestrator.cancel_protocol(id),
                };
                match result {
                    Ok(run) => Response::Protocol {
                        detail: ProtocolDetail {
                            steps: store.steps_for_protocol(run.id),
                            run,
                        },
                    },
                    Err(e) => error_response(e),
                }
            }
            Request::CheckCompleteProtocol { id } => {
                match self
                    .orchestrator
                    .check_and_complete_protocol(ProtocolRunId::new(id))
                {
                    Ok(complete) => Response::Complete { complete },
                    Err(e) => error_response(e),
                }
            }
            Request::ListProtocolArtifacts { id } => {
                let id = ProtocolRunId::new(id);
                let artifacts = store
                    .steps_for_protocol(id)
                    .iter()
                    .flat_map(|s| store.artifacts_for_step(s.id))
                    .collect();
                Response::Artifacts { artifacts }
            }

            // -- steps --
            Request::StepAction {
                id,
                action,
                engine_id,
                model,
            } => {
                let id = StepRunId::new(id);
                match action {
                    StepAction::Run => {
                        match self.orchestrator.run_step(id, engine_id, model).await {
                            Ok(step) => Response::Step { step },
                            Err(e) => error_response(e),
                        }
                    }
                    StepAction::Retry => {
                        match self.orchestrator.retry_step(id, engine_id, model).await {
                            Ok(step) => Response::Step { step },
                            Err(e) => error_response(e),
                        }
                    }
                    StepAction::Qa => match self.orchestrator.run_step_qa(id).await {
                        Ok(result) => match store.get_step_run(id) {
                            Ok(step) => Response::Qa { result, step },
                            Err(e) => store_error(e),
                        },
                        Err(e) => error_response(e),
                    },
                }
            }

            // -- job runs --
            Request::ListRuns {
                project_id,
                protocol_run_id,
                step_run_id,
                status,
                job_type,
                limit,
            } => Response::Runs {
                runs: store.list_job_runs(
                    project_id.map(ProjectId::new),
                    protocol_run_id.map(ProtocolRunId::new),
                    step_run_id.map(StepRunId::new),
                    status,
                    job_type.as_deref(),
                    if limit == 0 { 200 } else { limit },
                ),
            },
            Request::GetRun { run_id } => match store.get_job_run(&run_id) {
                Ok(run) => Response::Run { run },
                Err(e) => store_error(e),
            },
            Request::GetRunLogs { run_id, max_bytes } => match store.get_job_run(&run_id) {
                Ok(run) => {
                    let Some(log_path) = run.log_path else {
                        return Response::RunLogs {
                            log_path: None,
                            content: String::new(),
                            truncated: false,
                        };
                    };
                    match read_log_tail(&log_path, max_bytes) {
                        Ok((content, truncated)) => Response::RunLogs {
                            log_path: Some(log_path.display().to_string()),
                            content,
                            truncated,
                        },
                        Err(_) => Response::RunLogs {
                            log_path: Some(log_path.display().to_string()),
                            content: String::new(),
                            truncated: false,
                        },
                    }
                }
                Err(e) => store_error(e),
            },
            Request::ListRunArtifacts { run_id } => Response::Artifacts {
                artifacts: store.artifacts_for_run(&RunId::new(run_id)),
            },
            Request::GetArtifactContent { run_id, name } => {
                let artifact = store
                    .artifacts_for_run(&RunId::new(run_id))
                    .into_iter()
                    .find(|a| a.name == name);
                match artifact {
                    Some(artifact) => match std::fs::read_to_string(&artifact.path) {
                        Ok(content) => Response::ArtifactContent { name, content },
                        Err(e) => Response::Error {
                            kind: ErrorKind::NotFound,
                            message: format!("artifact unreadable: {e}"),
                        },
                    },
                    None => Response::Error {
                        kind: ErrorKind::NotFound,
                        message: format!("artifact not found: {name}"),
                    },
                }
            }

            // -- events --
            Request::RecentEvents {
                limit,
                project_id,
                protocol_id,
                event_type,
                category,
            } => {
                let filter = EventFilter {
                    project_id: project_id.map(ProjectId::new),
                    protocol_run_id: protocol_id.map(ProtocolRunId::new),
                    event_type,
                    category: parse_category(category),
                };
                match store.recent_events(&filter, if limit == 0 { 50 } else { limit }) {
                    Ok(events) => Response::Events { events },
                    Err(e) => store_error(e),
                }
            }

            // -- clarifications --
            Request::ListClarifications { project_id, status } => Response::Clarifications {
                clarifications: store
                    .list_clarifications(project_id.map(ProjectId::new), status),
            },
            Request::AnswerClarification {
                id,
                answer,
                answered_by,
            } => match store.answer_clarification(ClarificationId::new(id), answer, answered_by)
            {
                Ok(clarification) => Response::Clarification { clarification },
                Err(e) => store_error(e),
            },
            Request::DismissClarification { id } => {
                match store.dismiss_clarification(ClarificationId::new(id)) {
                    Ok(clarification) => Response::Clarification { clarification },
                    Err(e) => store_error(e),
                }
            }

            // -- reconciliation --
            Request::Reconcile {
                protocol_run_id,
                dry_run,
            } => {
                match self
                    .reconciliation
                    .reconcile_runs(protocol_run_id.map(ProtocolRunId::new), dry_run)
                    .await
                {
                    Ok(report) => {
                        *self.last_report.lock() = Some(report.clone());
                        Response::Reconciliation { report }
                    }
                    Err(e) => error_response(e),
                }
            }
            Request::ReconciliationStatus => Response::ReconciliationLast {
                report: self.last_report.lock().clone(),
            },

            // -- spec runs --
            Request::CreateSpecRun {
                project_id,
                spec_name,
                branch_name,
                base_branch,
            } => match store.create_spec_run(dg_storage::NewSpecRun {
                project_id: ProjectId::new(project_id),
                spec_name,
                spec_root: None,
                spec_path: None,
                branch_name,
                base_branch,
            }) {
                Ok(spec_run) => Response::SpecRun { spec_run },
                Err(e) => store_error(e),
            },
            Request::ListSpecRuns { project_id } => Response::SpecRuns {
                spec_runs: store.list_spec_runs(project_id.map(ProjectId::new)),
            },
            Request::SetSpecRunStatus { id, status } => {
                match store.set_spec_run_status(dg_core::SpecRunId::new(id), status) {
                    Ok(spec_run) => Response::SpecRun { spec_run },
                    Err(e) => store_error(e),
                }
            }

            // -- recovery --
            Request::RecoverStuck => match self.orchestrator.recover_stuck_protocols() {
                Ok(outcomes) => Response::Recovery { outcomes },
                Err(e) => error_response(e),
            },

            // -- webhooks --
            Request::WindmillWebhook {
                windmill_job_id,
                status,
                result,
                error,
            } => match apply_windmill_webhook(store, &windmill_job_id, &status, result, error) {
                Ok(outcome) => {
                    info!(windmill_job_id, outcome = outcome.status(), "windmill webhook");
                    Response::Webhook {
                        status: outcome.status().to_string(),
                    }
                }
                Err(e) => store_error(e),
            },
            Request::CiWebhook {
                provider,
                repo_url,
                summary,
            } => {
                // CI webhooks never fail the caller on parse trouble.
                match apply_ci_webhook(store, &provider, repo_url.as_deref(), summary.as_deref())
                {
                    Ok(outcome) => Response::Webhook {
                        status: outcome.status().to_string(),
                    },
                    Err(_) => Response::Webhook {
                        status: "ignored".to_string(),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
