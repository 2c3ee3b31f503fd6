// SPDX-License-Identifier: MIT

//! Traced adapter wrappers for consistent observability

use crate::executor::{
    ExecutorAdapter, ExecutorError, ExternalJob, FlowSummary, JobQuery,
};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any ExecutorAdapter
pub struct TracedExecutor<E> {
    inner: E,
}

impl<E> TracedExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: ExecutorAdapter> ExecutorAdapter for TracedExecutor<E> {
    async fn list_flows(&self, prefix: Option<&str>) -> Result<Vec<FlowSummary>, ExecutorError> {
        self.inner
            .list_flows(prefix)
            .instrument(tracing::info_span!("executor.list_flows"))
            .await
    }

    async fn get_flow(&self, path: &str) -> Result<FlowSummary, ExecutorError> {
        self.inner
            .get_flow(path)
            .instrument(tracing::info_span!("executor.get_flow", path))
            .await
    }

    async fn run_script(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<String, ExecutorError> {
        async {
            let start = std::time::Instant::now();
            let result = self.inner.run_script(path, payload).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(job_id) => tracing::info!(job_id = %job_id, elapsed_ms, "job submitted"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "submission failed"),
            }
            result
        }
        .instrument(tracing::info_span!("executor.run_script", path))
        .await
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<ExternalJob>, ExecutorError> {
        self.inner
            .list_jobs(query)
            .instrument(tracing::info_span!("executor.list_jobs"))
            .await
    }

    async fn get_job(&self, job_id: &str) -> Result<ExternalJob, ExecutorError> {
        let result = self
            .inner
            .get_job(job_id)
            .instrument(tracing::info_span!("executor.get_job", job_id))
            .await;
        if let Err(ref e) = result {
            tracing::debug!(job_id, error = %e, "get_job failed");
        }
        result
    }

    async fn get_job_logs(&self, job_id: &str) -> Result<String, ExecutorError> {
        self.inner
            .get_job_logs(job_id)
            .instrument(tracing::info_span!("executor.get_job_logs", job_id))
            .await
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        self.inner
            .health_check()
            .instrument(tracing::info_span!("executor.health_check"))
            .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
