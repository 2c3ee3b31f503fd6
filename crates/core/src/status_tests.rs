// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    pending_start = { ProtocolStatus::Pending, ProtocolOp::Start, ProtocolStatus::Planning },
    planned_start = { ProtocolStatus::Planned, ProtocolOp::Start, ProtocolStatus::Running },
    running_pause = { ProtocolStatus::Running, ProtocolOp::Pause, ProtocolStatus::Paused },
    paused_resume = { ProtocolStatus::Paused, ProtocolOp::Resume, ProtocolStatus::Running },
    blocked_resume = { ProtocolStatus::Blocked, ProtocolOp::Resume, ProtocolStatus::Running },
    pending_cancel = { ProtocolStatus::Pending, ProtocolOp::Cancel, ProtocolStatus::Cancelled },
    planning_cancel = { ProtocolStatus::Planning, ProtocolOp::Cancel, ProtocolStatus::Cancelled },
    running_cancel = { ProtocolStatus::Running, ProtocolOp::Cancel, ProtocolStatus::Cancelled },
    needs_qa_cancel = { ProtocolStatus::NeedsQa, ProtocolOp::Cancel, ProtocolStatus::Cancelled },
    failed_cancel = { ProtocolStatus::Failed, ProtocolOp::Cancel, ProtocolStatus::Cancelled },
)]
fn legal_protocol_transitions(from: ProtocolStatus, op: ProtocolOp, expected: ProtocolStatus) {
    assert_eq!(from.apply(op).unwrap(), expected);
}

#[parameterized(
    planning_start = { ProtocolStatus::Planning, ProtocolOp::Start },
    running_start = { ProtocolStatus::Running, ProtocolOp::Start },
    pending_pause = { ProtocolStatus::Pending, ProtocolOp::Pause },
    paused_pause = { ProtocolStatus::Paused, ProtocolOp::Pause },
    running_resume = { ProtocolStatus::Running, ProtocolOp::Resume },
    completed_start = { ProtocolStatus::Completed, ProtocolOp::Start },
    cancelled_resume = { ProtocolStatus::Cancelled, ProtocolOp::Resume },
)]
fn illegal_protocol_transitions(from: ProtocolStatus, op: ProtocolOp) {
    let err = from.apply(op).unwrap_err();
    assert_eq!(err.entity, "protocol_run");
    assert_eq!(err.from, from.to_string());
}

#[test]
fn cancel_on_settled_runs_is_a_no_op() {
    assert_eq!(
        ProtocolStatus::Completed.apply(ProtocolOp::Cancel).unwrap(),
        ProtocolStatus::Completed
    );
    assert_eq!(
        ProtocolStatus::Cancelled.apply(ProtocolOp::Cancel).unwrap(),
        ProtocolStatus::Cancelled
    );
}

#[test]
fn applying_the_same_op_twice_never_double_advances() {
    // Second application either fails or returns the same status.
    let once = ProtocolStatus::Pending.apply(ProtocolOp::Start).unwrap();
    assert_eq!(once, ProtocolStatus::Planning);
    assert!(once.apply(ProtocolOp::Start).is_err());

    let cancelled = ProtocolStatus::Running.apply(ProtocolOp::Cancel).unwrap();
    assert_eq!(
        cancelled.apply(ProtocolOp::Cancel).unwrap(),
        ProtocolStatus::Cancelled
    );
}

#[test]
fn step_terminal_set() {
    for s in [
        StepStatus::Completed,
        StepStatus::Failed,
        StepStatus::Cancelled,
        StepStatus::Skipped,
        StepStatus::Timeout,
    ] {
        assert!(s.is_terminal(), "{s} should be terminal");
    }
    for s in [
        StepStatus::Pending,
        StepStatus::Running,
        StepStatus::NeedsQa,
        StepStatus::Blocked,
    ] {
        assert!(!s.is_terminal(), "{s} should not be terminal");
        assert!(s.holds_protocol_open(), "{s} should hold the protocol open");
    }
}

#[parameterized(
    pending = { StepStatus::Pending, true },
    failed = { StepStatus::Failed, true },
    blocked = { StepStatus::Blocked, true },
    running = { StepStatus::Running, false },
    needs_qa = { StepStatus::NeedsQa, false },
    completed = { StepStatus::Completed, false },
    timeout = { StepStatus::Timeout, false },
)]
fn run_step_validity(status: StepStatus, expected: bool) {
    assert_eq!(status.can_run(), expected);
}

#[parameterized(
    failed = { StepStatus::Failed, true },
    timeout = { StepStatus::Timeout, true },
    blocked = { StepStatus::Blocked, true },
    pending = { StepStatus::Pending, false },
    running = { StepStatus::Running, false },
    completed = { StepStatus::Completed, false },
)]
fn retry_step_validity(status: StepStatus, expected: bool) {
    assert_eq!(status.can_retry(), expected);
}

#[parameterized(
    queued = { "queued", Some(JobStatus::Queued) },
    running = { "running", Some(JobStatus::Running) },
    success = { "success", Some(JobStatus::Succeeded) },
    completed = { "completed", Some(JobStatus::Succeeded) },
    failure = { "failure", Some(JobStatus::Failed) },
    failed = { "failed", Some(JobStatus::Failed) },
    cancelled = { "cancelled", Some(JobStatus::Cancelled) },
    canceled = { "canceled", Some(JobStatus::Cancelled) },
    unknown = { "suspended", None },
)]
fn webhook_status_map(input: &str, expected: Option<JobStatus>) {
    assert_eq!(JobStatus::from_webhook(input), expected);
}

#[test]
fn statuses_serialize_snake_case() {
    assert_eq!(
        serde_json::to_string(&ProtocolStatus::NeedsQa).unwrap(),
        "\"needs_qa\""
    );
    assert_eq!(
        serde_json::to_string(&StepStatus::Timeout).unwrap(),
        "\"timeout\""
    );
    assert_eq!(
        serde_json::to_string(&JobStatus::Succeeded).unwrap(),
        "\"succeeded\""
    );
}
