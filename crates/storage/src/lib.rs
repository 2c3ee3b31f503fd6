// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for DevGodzilla: durable event log, materialized state,
//! snapshots, and the transactional `Store` facade.

mod checkpoint;
mod log;
mod snapshot;
mod state;
mod store;

pub use checkpoint::{CheckpointError, CheckpointHandle, CheckpointResult, Checkpointer};
pub use log::{EventLog, EventLogError};
pub use snapshot::{Snapshot, SnapshotError};
pub use state::MaterializedState;
pub use store::{
    JobUpdate, NewArtifact, NewClarification, NewJobRun, NewProject, NewProtocolRun, NewQaResult,
    NewSpecRun, ProjectUpdate, StepUpdate, Store, StoreError, StorePaths, RECENT_EVENTS_MAX,
};
