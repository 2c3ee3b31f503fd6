// SPDX-License-Identifier: MIT

//! In-memory executor for tests.

use super::{
    ExecutorAdapter, ExecutorError, ExternalJob, ExternalJobStatus, FlowSummary, JobQuery,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fake executor: submissions assign sequential ids; tests drive job
/// status with [`FakeExecutor::set_job_status`].
pub struct FakeExecutor {
    jobs: Mutex<HashMap<String, ExternalJob>>,
    submissions: Mutex<Vec<(String, serde_json::Value)>>,
    flows: Mutex<Vec<FlowSummary>>,
    next_id: AtomicU64,
    healthy: Mutex<bool>,
    fail_submissions: Mutex<bool>,
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            flows: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            healthy: Mutex::new(true),
            fail_submissions: Mutex::new(false),
        }
    }

    /// Register a job the executor "knows about".
    pub fn insert_job(&self, id: &str, status: ExternalJobStatus) {
        self.jobs.lock().insert(
            id.to_string(),
            ExternalJob {
                id: id.to_string(),
                status,
                result: None,
                error: None,
                created_at: None,
                started_at: None,
                completed_at: None,
            },
        );
    }

    /// Move an existing job to a new status.
    pub fn set_job_status(&self, id: &str, status: ExternalJobStatus) {
        if let Some(job) = self.jobs.lock().get_mut(id) {
            job.status = status;
        }
    }

    pub fn add_flow(&self, path: &str, summary: &str) {
        self.flows.lock().push(FlowSummary {
            path: path.to_string(),
            name: None,
            summary: Some(summary.to_string()),
        });
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock() = healthy;
    }

    /// Make future `run_script` calls fail.
    pub fn fail_submissions(&self, fail: bool) {
        *self.fail_submissions.lock() = fail;
    }

    /// Script submissions observed so far.
    pub fn submissions(&self) -> Vec<(String, serde_json::Value)> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl ExecutorAdapter for FakeExecutor {
    async fn list_flows(&self, prefix: Option<&str>) -> Result<Vec<FlowSummary>, ExecutorError> {
        Ok(self
            .flows
            .lock()
            .iter()
            .filter(|f| prefix.map(|p| f.path.starts_with(p)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_flow(&self, path: &str) -> Result<FlowSummary, ExecutorError> {
        self.flows
            .lock()
            .iter()
            .find(|f| f.path == path)
            .cloned()
            .ok_or_else(|| ExecutorError::NotFound(path.to_string()))
    }

    async fn run_script(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<String, ExecutorError> {
        if *self.fail_submissions.lock() {
            return Err(ExecutorError::Api {
                status: 500,
                message: "submission rejected".into(),
            });
        }
        let id = format!("wm-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.insert_job(&id, ExternalJobStatus::Queued);
        self.submissions
            .lock()
            .push((path.to_string(), payload.clone()));
        Ok(id)
    }

    async fn list_jobs(&self, _query: &JobQuery) -> Result<Vec<ExternalJob>, ExecutorError> {
        let mut jobs: Vec<ExternalJob> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    async fn get_job(&self, job_id: &str) -> Result<ExternalJob, ExecutorError> {
        self.jobs
            .lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| ExecutorError::NotFound(job_id.to_string()))
    }

    async fn get_job_logs(&self, job_id: &str) -> Result<String, ExecutorError> {
        if self.jobs.lock().contains_key(job_id) {
            Ok(format!("logs for {job_id}\n"))
        } else {
            Err(ExecutorError::NotFound(job_id.to_string()))
        }
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        if *self.healthy.lock() {
            Ok(())
        } else {
            Err(ExecutorError::Unavailable("fake executor unhealthy".into()))
        }
    }
}
