// SPDX-License-Identifier: MIT

use super::*;

fn job(json: serde_json::Value) -> WindmillJob {
    serde_json::from_value(json).unwrap()
}

#[test]
fn completed_success_maps_to_completed() {
    let job = job(serde_json::json!({
        "id": "J1", "type": "CompletedJob", "success": true,
        "result": {"ok": true},
    }));
    let external = job.into_external();
    assert_eq!(external.status, ExternalJobStatus::Completed);
    assert!(external.error.is_none());
}

#[test]
fn completed_failure_maps_to_failed_with_error() {
    let job = job(serde_json::json!({
        "id": "J2", "type": "CompletedJob", "success": false,
        "result": {"error": {"message": "step exploded"}},
    }));
    let external = job.into_external();
    assert_eq!(external.status, ExternalJobStatus::Failed);
    assert_eq!(external.error.as_deref(), Some("step exploded"));
}

#[test]
fn cancelled_wins_over_everything() {
    let job = job(serde_json::json!({
        "id": "J3", "type": "CompletedJob", "success": true, "canceled": true,
    }));
    assert_eq!(job.status(), ExternalJobStatus::Cancelled);
}

#[test]
fn queued_and_running_states() {
    let queued = job(serde_json::json!({"id": "J4", "type": "QueuedJob", "running": false}));
    assert_eq!(queued.status(), ExternalJobStatus::Queued);

    let running = job(serde_json::json!({"id": "J5", "type": "QueuedJob", "running": true}));
    assert_eq!(running.status(), ExternalJobStatus::Running);
}

#[test]
fn unknown_shape_maps_to_unknown() {
    let other = job(serde_json::json!({"id": "J6"}));
    assert_eq!(other.status(), ExternalJobStatus::Unknown);
}

#[test]
fn url_layout_matches_windmill_rest() {
    let executor = WindmillExecutor::new(WindmillConfig {
        base_url: "http://wm.example.com/".into(),
        workspace: "dev".into(),
        token: "t".into(),
    })
    .unwrap();
    assert_eq!(
        executor.url("jobs/run/p/f/devgodzilla/execute_step"),
        "http://wm.example.com/api/w/dev/jobs/run/p/f/devgodzilla/execute_step"
    );
}
