// SPDX-License-Identifier: MIT

//! HTTP adapter for a Windmill instance.

use super::{
    ExecutorAdapter, ExecutorError, ExternalJob, ExternalJobStatus, FlowSummary, JobQuery,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a Windmill workspace.
#[derive(Debug, Clone)]
pub struct WindmillConfig {
    pub base_url: String,
    pub workspace: String,
    pub token: String,
}

/// Windmill REST client.
pub struct WindmillExecutor {
    config: WindmillConfig,
    client: reqwest::Client,
}

/// Shape of Windmill's job payloads (the fields we consume).
#[derive(Debug, Deserialize)]
struct WindmillJob {
    id: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    canceled: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    logs: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    completed_at: Option<String>,
    /// "QueuedJob" or "CompletedJob"
    #[serde(default, rename = "type")]
    job_type: Option<String>,
}

impl WindmillJob {
    fn status(&self) -> ExternalJobStatus {
        if self.canceled {
            return ExternalJobStatus::Cancelled;
        }
        match (self.job_type.as_deref(), self.success, self.running) {
            (Some("CompletedJob"), Some(true), _) => ExternalJobStatus::Completed,
            (Some("CompletedJob"), Some(false), _) => ExternalJobStatus::Failed,
            (Some("CompletedJob"), None, _) => ExternalJobStatus::Completed,
            (_, _, true) => ExternalJobStatus::Running,
            (Some("QueuedJob"), _, false) => ExternalJobStatus::Queued,
            _ => ExternalJobStatus::Unknown,
        }
    }

    fn into_external(self) -> ExternalJob {
        let status = self.status();
        let error = if status == ExternalJobStatus::Failed {
            self.result
                .as_ref()
                .and_then(|r| r.get("error"))
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .or_else(|| self.logs.clone())
        } else {
            None
        };
        ExternalJob {
            id: self.id,
            status,
            result: self.result,
            error,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

impl WindmillExecutor {
    pub fn new(config: WindmillConfig) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/api/w/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.workspace,
            suffix
        )
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.config.token)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ExecutorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ExecutorError::NotFound(message));
        }
        Err(ExecutorError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ExecutorAdapter for WindmillExecutor {
    async fn list_flows(&self, prefix: Option<&str>) -> Result<Vec<FlowSummary>, ExecutorError> {
        let mut request = self.authed(self.client.get(self.url("flows/list")));
        if let Some(prefix) = prefix {
            request = request.query(&[("path_start", prefix)]);
        }
        let response = Self::check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn get_flow(&self, path: &str) -> Result<FlowSummary, ExecutorError> {
        let request = self.authed(
            self.client
                .get(self.url(&format!("flows/get/{path}"))),
        );
        let response = Self::check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn run_script(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<String, ExecutorError> {
        let request = self
            .authed(self.client.post(self.url(&format!("jobs/run/p/{path}"))))
            .json(payload);
        let response = Self::check_status(request.send().await?).await?;
        // Windmill answers the submitted job uuid as plain text.
        let job_id = response.text().await?.trim().trim_matches('"').to_string();
        debug!(script = path, job_id = %job_id, "submitted windmill job");
        Ok(job_id)
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<ExternalJob>, ExecutorError> {
        let mut request = self.authed(self.client.get(self.url("jobs/list")));
        if let Some(ref path) = query.script_path {
            request = request.query(&[("script_path_exact", path.as_str())]);
        }
        if let Some(per_page) = query.per_page {
            request = request.query(&[("per_page", per_page)]);
        }
        if let Some(page) = query.page {
            request = request.query(&[("page", page)]);
        }
        let response = Self::check_status(request.send().await?).await?;
        let jobs: Vec<WindmillJob> = response.json().await?;
        Ok(jobs.into_iter().map(WindmillJob::into_external).collect())
    }

    async fn get_job(&self, job_id: &str) -> Result<ExternalJob, ExecutorError> {
        let request = self.authed(
            self.client
                .get(self.url(&format!("jobs_u/get/{job_id}"))),
        );
        let response = Self::check_status(request.send().await?).await?;
        let job: WindmillJob = response.json().await?;
        Ok(job.into_external())
    }

    async fn get_job_logs(&self, job_id: &str) -> Result<String, ExecutorError> {
        let request = self.authed(
            self.client
                .get(self.url(&format!("jobs_u/get_logs/{job_id}"))),
        );
        let response = Self::check_status(request.send().await?).await?;
        Ok(response.text().await?)
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        let url = format!(
            "{}/api/version",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExecutorError::Unavailable(format!(
                "version endpoint returned {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
#[path = "windmill_tests.rs"]
mod tests;
