// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: agent engines and the external executor.

pub mod engine;
pub mod executor;
pub mod subprocess;
pub mod traced;

pub use engine::{
    global_engine_registry, reset_global_engine_registry, CliEngine, Engine, EngineError,
    EngineKind, EngineMetadata, EngineRegistry, EngineRequest, EngineResponse,
};
pub use executor::{
    ExecutorAdapter, ExecutorError, ExternalJob, ExternalJobStatus, FlowSummary, JobQuery,
    WindmillConfig, WindmillExecutor,
};
pub use traced::TracedExecutor;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use engine::ScriptedEngine;
#[cfg(any(test, feature = "test-support"))]
pub use executor::FakeExecutor;
