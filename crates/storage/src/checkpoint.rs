// SPDX-License-Identifier: MIT

//! Background checkpointing.
//!
//! The checkpointer clones the state on the caller's thread (~ms) and
//! runs serialization, compression, and fsync on a background thread.
//! The snapshot write is atomic; a crash mid-checkpoint leaves the
//! previous snapshot intact and recovery replays the longer log tail.

use crate::{MaterializedState, Snapshot, SnapshotError};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors from checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("checkpoint failed: {0}")]
    Failed(String),
}

/// Result of a completed checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointResult {
    /// Event id the snapshot covers
    pub last_event_id: u64,
    /// Size of the compressed snapshot in bytes
    pub size_bytes: u64,
}

/// Handle to a running checkpoint operation.
pub struct CheckpointHandle {
    /// Event id being checkpointed
    pub last_event_id: u64,
    receiver: mpsc::Receiver<Result<CheckpointResult, CheckpointError>>,
    // NOTE(lifetime): Keep thread alive
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl CheckpointHandle {
    /// Block until the snapshot is fully durable.
    pub fn wait(self) -> Result<CheckpointResult, CheckpointError> {
        self.receiver
            .recv()
            .map_err(|_| CheckpointError::Failed("checkpoint thread panicked".into()))?
    }

    /// Check for completion without blocking.
    pub fn try_wait(&self) -> Option<Result<CheckpointResult, CheckpointError>> {
        self.receiver.try_recv().ok()
    }
}

/// Manages background snapshot operations.
pub struct Checkpointer {
    snapshot_path: PathBuf,
}

impl Checkpointer {
    pub fn new(snapshot_path: PathBuf) -> Self {
        Self { snapshot_path }
    }

    /// Start a background checkpoint of the given state.
    pub fn start(&self, last_event_id: u64, state: &MaterializedState) -> CheckpointHandle {
        let state_clone = state.clone();
        let snapshot_path = self.snapshot_path.clone();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = checkpoint_blocking(last_event_id, state_clone, &snapshot_path);
            let _ = tx.send(result);
        });

        CheckpointHandle {
            last_event_id,
            receiver: rx,
            handle,
        }
    }

    /// Perform a synchronous checkpoint (for shutdown).
    pub fn checkpoint_sync(
        &self,
        last_event_id: u64,
        state: &MaterializedState,
    ) -> Result<CheckpointResult, CheckpointError> {
        checkpoint_blocking(last_event_id, state.clone(), &self.snapshot_path)
    }
}

fn checkpoint_blocking(
    last_event_id: u64,
    state: MaterializedState,
    snapshot_path: &std::path::Path,
) -> Result<CheckpointResult, CheckpointError> {
    let snapshot = Snapshot::new(last_event_id, state);
    snapshot.save(snapshot_path)?;
    let size_bytes = std::fs::metadata(snapshot_path)
        .map(|m| m.len())
        .unwrap_or(0);
    Ok(CheckpointResult {
        last_event_id,
        size_bytes,
    })
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
