// SPDX-License-Identifier: MIT

use super::*;
use dg_core::{EventCategory, ProjectId, ProtocolRunId, ProtocolStatus};
use std::io::Write as _;
use tempfile::TempDir;

fn status_event(protocol: u64) -> Event {
    Event::ProtocolStatusChanged {
        protocol_run_id: ProtocolRunId::new(protocol),
        project_id: ProjectId::new(1),
        previous: ProtocolStatus::Pending,
        new: ProtocolStatus::Planning,
        reason: None,
        at_ms: 1,
    }
}

fn orphan_event(job: &str) -> Event {
    Event::WebhookOrphanJob {
        windmill_job_id: job.into(),
        status: "running".into(),
        at_ms: 1,
    }
}

#[test]
fn ids_are_strictly_monotonic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.wal");
    let mut log = EventLog::open(&path).unwrap();

    let a = log.append(status_event(1), 10).unwrap();
    let b = log.append(orphan_event("J1"), 11).unwrap();
    let c = log.append(status_event(2), 12).unwrap();
    assert_eq!((a.id, b.id, c.id), (1, 2, 3));
    assert_eq!(log.last_id(), 3);
}

#[test]
fn ids_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut log = EventLog::open(&path).unwrap();
        log.append(status_event(1), 1).unwrap();
        log.append(status_event(2), 2).unwrap();
        log.sync().unwrap();
    }

    let mut log = EventLog::open(&path).unwrap();
    assert_eq!(log.last_id(), 2);
    let next = log.append(status_event(3), 3).unwrap();
    assert_eq!(next.id, 3);
}

#[test]
fn read_after_returns_only_newer_records() {
    let dir = TempDir::new().unwrap();
    let mut log = EventLog::open(&dir.path().join("events.wal")).unwrap();
    for i in 0..5 {
        log.append(status_event(i), i).unwrap();
    }

    let records = log.read_after(3, &EventFilter::default(), 0).unwrap();
    let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![4, 5]);
}

#[test]
fn read_after_applies_filter_and_limit() {
    let dir = TempDir::new().unwrap();
    let mut log = EventLog::open(&dir.path().join("events.wal")).unwrap();
    log.append(status_event(1), 1).unwrap();
    log.append(orphan_event("J1"), 2).unwrap();
    log.append(status_event(1), 3).unwrap();
    log.append(status_event(2), 4).unwrap();

    let filter = EventFilter {
        protocol_run_id: Some(ProtocolRunId::new(1)),
        ..Default::default()
    };
    let records = log.read_after(0, &filter, 0).unwrap();
    assert_eq!(records.len(), 2);

    let webhooks = EventFilter {
        category: Some(EventCategory::Webhook),
        ..Default::default()
    };
    let records = log.read_after(0, &webhooks, 1).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 2);
}

#[test]
fn reads_observe_unsynced_appends() {
    let dir = TempDir::new().unwrap();
    let mut log = EventLog::open(&dir.path().join("events.wal")).unwrap();
    log.append(status_event(1), 1).unwrap();
    // No explicit sync: reads publish buffered bytes themselves.
    let records = log.entries_after(0).unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn sync_becomes_due_after_the_window() {
    let dir = TempDir::new().unwrap();
    let mut log = EventLog::open(&dir.path().join("events.wal")).unwrap();
    assert!(!log.sync_due());

    log.append(status_event(1), 1).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(15));
    assert!(log.sync_due());

    log.sync().unwrap();
    assert!(!log.sync_due());
}

#[test]
fn torn_tail_is_truncated_with_a_sidecar() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut log = EventLog::open(&path).unwrap();
        log.append(status_event(1), 1).unwrap();
        log.append(status_event(2), 2).unwrap();
        log.sync().unwrap();
    }
    let good_len = std::fs::metadata(&path).unwrap().len();
    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(b"{\"id\":3,\"ts_ms\":3,\"eve").unwrap();
    }

    let mut log = EventLog::open(&path).unwrap();
    assert_eq!(log.last_id(), 2);

    // The valid prefix is untouched; the torn bytes moved aside.
    assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    let sidecar = std::fs::read(path.with_extension("corrupt")).unwrap();
    assert_eq!(sidecar, b"{\"id\":3,\"ts_ms\":3,\"eve");

    // New appends continue after the valid prefix.
    let next = log.append(status_event(3), 3).unwrap();
    assert_eq!(next.id, 3);
    assert_eq!(log.entries_after(0).unwrap().len(), 3);
}

#[test]
fn complete_json_without_newline_counts_as_torn() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.wal");

    {
        let mut log = EventLog::open(&path).unwrap();
        log.append(status_event(1), 1).unwrap();
        log.sync().unwrap();
    }
    // Parseable record, but the crash ate its newline terminator.
    let whole = serde_json::to_vec(&EventRecord {
        id: 2,
        ts_ms: 2,
        event: status_event(2),
    })
    .unwrap();
    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(&whole).unwrap();
    }

    let log = EventLog::open(&path).unwrap();
    assert_eq!(log.last_id(), 1);
    assert!(path.with_extension("corrupt").exists());
}

#[test]
fn repeated_crashes_accumulate_in_the_sidecar() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.wal");

    for round in 0..2u8 {
        {
            let mut log = EventLog::open(&path).unwrap();
            log.append(status_event(round as u64 + 1), 1).unwrap();
            log.sync().unwrap();
        }
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(b"garbage").unwrap();
    }

    let log = EventLog::open(&path).unwrap();
    assert_eq!(log.last_id(), 2);
    let sidecar = std::fs::read(path.with_extension("corrupt")).unwrap();
    assert_eq!(sidecar, b"garbagegarbage");
    drop(log);
}
