//! SSE resume and webhook idempotence specs.

use crate::prelude::Stack;
use dg_core::RunId;
use dg_daemon::sse::{stream_events, EventStreamOptions};
use dg_daemon::webhooks::apply_windmill_webhook;
use dg_storage::NewJobRun;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn sse_resume_delivers_exactly_the_missed_events() {
    let stack = Stack::new();
    stack.seed_protocol(2); // project + protocol + 2 steps = 4 events

    let last = stack.store.last_event_id();
    assert!(last >= 3);

    // Client saw everything up to last-1; resume must deliver exactly
    // one frame: the last event.
    let mut buffer = Vec::new();
    stream_events(
        Arc::clone(&stack.store),
        &mut buffer,
        last - 1,
        EventStreamOptions {
            max_events: 1,
            heartbeat: Duration::from_millis(50),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let output = String::from_utf8(buffer).unwrap();

    let ids: Vec<&str> = output
        .lines()
        .filter(|line| line.starts_with("id: "))
        .collect();
    assert_eq!(ids, vec![format!("id: {last}").as_str()]);

    // Resuming from the last delivered id yields zero duplicates: the
    // stream goes idle and emits a heartbeat instead.
    let store = Arc::clone(&stack.store);
    let handle = tokio::spawn(async move {
        let mut buffer = Vec::new();
        stream_events(
            store,
            &mut buffer,
            last,
            EventStreamOptions {
                max_events: 1,
                heartbeat: Duration::from_millis(20),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        String::from_utf8(buffer).unwrap()
    });
    tokio::time::sleep(Duration::from_millis(80)).await;
    stack
        .store
        .record_webhook_orphan("J-wake".into(), "running".into())
        .unwrap();
    let output = handle.await.unwrap();

    assert!(output.contains(": heartbeat\n\n"));
    assert!(!output.contains(&format!("id: {last}\n")));
    assert!(output.contains(&format!("id: {}\n", last + 1)));
}

#[tokio::test]
async fn webhook_redelivery_is_idempotent() {
    let stack = Stack::new();
    let (run, steps) = stack.seed_protocol(1);
    stack
        .store
        .create_job_run(NewJobRun {
            run_id: RunId::new("r-1"),
            job_type: "execute_step".into(),
            project_id: Some(run.project_id),
            protocol_run_id: Some(run.id),
            step_run_id: Some(steps[0].id),
            windmill_job_id: Some("J1".into()),
            params: json!({}),
            log_path: None,
        })
        .unwrap();

    let first = apply_windmill_webhook(&stack.store, "J1", "success", None, None).unwrap();
    assert_eq!(first.status(), "updated");
    let after_first = stack.store.last_event_id();

    // Re-delivering the same status changes nothing and emits no event.
    let second = apply_windmill_webhook(&stack.store, "J1", "success", None, None).unwrap();
    assert_eq!(second.status(), "ignored");
    assert_eq!(stack.store.last_event_id(), after_first);
}
