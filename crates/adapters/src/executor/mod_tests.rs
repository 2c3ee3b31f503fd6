// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn status_serde_and_terminality() {
    assert_eq!(
        serde_json::to_string(&ExternalJobStatus::Completed).unwrap(),
        "\"completed\""
    );
    let unknown: ExternalJobStatus = serde_json::from_str("\"suspended\"").unwrap();
    assert_eq!(unknown, ExternalJobStatus::Unknown);

    assert!(ExternalJobStatus::Completed.is_terminal());
    assert!(ExternalJobStatus::Failed.is_terminal());
    assert!(ExternalJobStatus::Cancelled.is_terminal());
    assert!(!ExternalJobStatus::Queued.is_terminal());
    assert!(!ExternalJobStatus::Running.is_terminal());
    assert!(!ExternalJobStatus::Unknown.is_terminal());
}

#[tokio::test]
async fn fake_executor_submission_round_trip() {
    let executor = FakeExecutor::new();
    let id = executor
        .run_script("f/devgodzilla/execute_step", &serde_json::json!({"step": 1}))
        .await
        .unwrap();
    assert_eq!(id, "wm-1");

    let job = executor.get_job(&id).await.unwrap();
    assert_eq!(job.status, ExternalJobStatus::Queued);

    executor.set_job_status(&id, ExternalJobStatus::Completed);
    let job = executor.get_job(&id).await.unwrap();
    assert_eq!(job.status, ExternalJobStatus::Completed);

    assert_eq!(executor.submissions().len(), 1);
}

#[tokio::test]
async fn fake_executor_unknown_job_is_not_found() {
    let executor = FakeExecutor::new();
    let err = executor.get_job("nope").await.unwrap_err();
    assert!(matches!(err, ExecutorError::NotFound(_)));
}

#[tokio::test]
async fn fake_executor_health_toggle() {
    let executor = FakeExecutor::new();
    assert!(executor.health_check().await.is_ok());
    executor.set_healthy(false);
    assert!(executor.health_check().await.is_err());
}

#[tokio::test]
async fn fake_executor_flow_listing() {
    let executor = FakeExecutor::new();
    executor.add_flow("f/devgodzilla/execute_step", "execute a step");
    executor.add_flow("f/other/thing", "unrelated");

    let all = executor.list_flows(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let scoped = executor.list_flows(Some("f/devgodzilla")).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert!(executor.get_flow("f/other/thing").await.is_ok());
}
