// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn serde_round_trip_preserves_equality() {
    let run = JobRun {
        run_id: RunId::new("r-1"),
        job_type: "execute_step".into(),
        status: JobStatus::Queued,
        project_id: Some(ProjectId::new(1)),
        protocol_run_id: Some(ProtocolRunId::new(2)),
        step_run_id: Some(StepRunId::new(3)),
        windmill_job_id: Some("J1".into()),
        params: json!({"engine_id": "opencode"}),
        result: None,
        error: None,
        log_path: Some(PathBuf::from("/tmp/logs/r-1.log")),
        created_at_ms: 10,
        started_at_ms: None,
        finished_at_ms: None,
    };
    let text = serde_json::to_string(&run).unwrap();
    let back: JobRun = serde_json::from_str(&text).unwrap();
    assert_eq!(back, run);
}

#[test]
fn terminal_statuses() {
    let mut run = JobRun {
        run_id: RunId::new("r-2"),
        job_type: "qa".into(),
        status: JobStatus::Running,
        project_id: None,
        protocol_run_id: None,
        step_run_id: None,
        windmill_job_id: None,
        params: json!({}),
        result: None,
        error: None,
        log_path: None,
        created_at_ms: 0,
        started_at_ms: Some(1),
        finished_at_ms: None,
    };
    assert!(!run.is_terminal());
    run.status = JobStatus::Succeeded;
    assert!(run.is_terminal());
}
