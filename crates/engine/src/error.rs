// SPDX-License-Identifier: MIT

//! Error taxonomy for the orchestration engine.
//!
//! Failures become categorized outcomes before crossing a boundary: the
//! daemon maps each variant onto a wire status, never a raw panic.

use dg_adapters::{EngineError, ExecutorError};
use dg_storage::StoreError;
use thiserror::Error;

/// Errors surfaced by orchestration operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Store-level failures, including `InvalidTransition` and
    /// `NotFound` from guard checks.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Engine binary or credentials missing. The step has already been
    /// moved to `blocked` and a clarification upserted.
    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    /// The agent asked for information it does not have. The step has
    /// already been moved to `blocked`.
    #[error("execution blocked: {0}")]
    ExecutionBlocked(String),

    /// Execution wall clock exceeded. The step has already been moved
    /// to `timeout`.
    #[error("execution timed out after {0}s")]
    Timeout(u64),

    /// Network or rate-limit trouble; retried with backoff before it
    /// reaches a caller.
    #[error("transient error: {0}")]
    Transient(String),

    /// The external executor misbehaved.
    #[error("external executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Invalid path contract or settings at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<EngineError> for OrchestratorError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Unavailable(message) => OrchestratorError::AgentUnavailable(message),
            EngineError::Timeout(secs) => OrchestratorError::Timeout(secs),
            EngineError::Spawn(message) => OrchestratorError::AgentUnavailable(message),
            EngineError::Io(e) => OrchestratorError::Transient(e.to_string()),
        }
    }
}

impl OrchestratorError {
    /// Transient errors may be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrchestratorError::Transient(_))
    }
}
