// SPDX-License-Identifier: MIT

use super::*;
use crate::executor::{ExternalJobStatus, FakeExecutor};

#[tokio::test]
async fn traced_executor_delegates() {
    let traced = TracedExecutor::new(FakeExecutor::new());
    let id = traced
        .run_script("f/x/y", &serde_json::json!({}))
        .await
        .unwrap();
    let job = traced.get_job(&id).await.unwrap();
    assert_eq!(job.status, ExternalJobStatus::Queued);
    assert!(traced.health_check().await.is_ok());
}
