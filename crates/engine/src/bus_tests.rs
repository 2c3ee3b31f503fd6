// SPDX-License-Identifier: MIT

use super::*;
use dg_core::{Event, EventRecord};
use parking_lot::Mutex;
use std::sync::Arc;

fn record(id: u64, event: Event) -> EventRecord {
    EventRecord {
        id,
        ts_ms: id,
        event,
    }
}

fn orphan(id: u64) -> EventRecord {
    record(
        id,
        Event::WebhookOrphanJob {
            windmill_job_id: format!("J{id}"),
            status: "running".into(),
            at_ms: id,
        },
    )
}

#[test]
fn any_subscribers_see_every_event() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_any(move |r| sink.lock().push(r.id));

    bus.publish(&orphan(1));
    bus.publish(&orphan(2));
    assert_eq!(*seen.lock(), vec![1, 2]);
}

#[test]
fn typed_subscribers_filter_by_event_name() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe("webhook_orphan_job", move |r| sink.lock().push(r.id));

    bus.publish(&orphan(1));
    bus.publish(&record(
        2,
        Event::CiEvent {
            provider: "github".into(),
            project_id: None,
            repo_url: "r".into(),
            summary: "push".into(),
            at_ms: 2,
        },
    ));
    assert_eq!(*seen.lock(), vec![1]);
}

#[test]
fn panicking_handler_does_not_reach_publisher() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_any(|_| panic!("bad handler"));
    bus.subscribe_any(move |r| sink.lock().push(r.id));

    // Publisher survives, later handlers still run.
    bus.publish(&orphan(9));
    assert_eq!(*seen.lock(), vec![9]);
}

#[tokio::test]
async fn async_dispatch_preserves_order() {
    let bus = Arc::new(EventBus::new());
    bus.start_dispatcher();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_any(move |r| sink.lock().push(r.id));

    for id in 1..=10 {
        bus.publish_async(orphan(id));
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(*seen.lock(), (1..=10).collect::<Vec<u64>>());
}

#[test]
fn publish_async_without_dispatcher_falls_back_to_sync() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe_any(move |r| sink.lock().push(r.id));

    bus.publish_async(orphan(3));
    assert_eq!(*seen.lock(), vec![3]);
}
