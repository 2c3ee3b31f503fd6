// SPDX-License-Identifier: MIT

//! Agent engine adapters.
//!
//! An engine is one way to run an AI agent against a workspace. Engines
//! carry explicit metadata and register by id; there is no runtime
//! reflection.

mod cli;
#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use cli::CliEngine;
#[cfg(any(test, feature = "test-support"))]
pub use fake::ScriptedEngine;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Hard fallback engine id when nothing else resolves.
pub const FALLBACK_ENGINE_ID: &str = "opencode";

/// How an engine is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Cli,
    Ide,
    Api,
}

/// Static description of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMetadata {
    pub id: String,
    pub display_name: String,
    pub kind: EngineKind,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl EngineMetadata {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, kind: EngineKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind,
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }
}

/// One execution request handed to an engine.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// Resolved prompt text, delivered on stdin.
    pub prompt: String,
    /// Working directory (worktree or project path).
    pub working_dir: PathBuf,
    pub model: Option<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Raw engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl EngineResponse {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors from engine execution
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine timed out after {0}s")]
    Timeout(u64),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An agent engine.
#[async_trait]
pub trait Engine: Send + Sync {
    fn metadata(&self) -> &EngineMetadata;

    /// Whether the engine's binary/credentials are usable right now.
    async fn check_availability(&self) -> bool;

    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, EngineError>;
}

/// Registry of engines keyed by id.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn Engine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: Arc<dyn Engine>) {
        self.engines
            .insert(engine.metadata().id.clone(), engine);
    }

    pub fn unregister(&mut self, engine_id: &str) -> Option<Arc<dyn Engine>> {
        self.engines.remove(engine_id)
    }

    pub fn get(&self, engine_id: &str) -> Option<Arc<dyn Engine>> {
        self.engines.get(engine_id).cloned()
    }

    pub fn has(&self, engine_id: &str) -> bool {
        self.engines.contains_key(engine_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.engines.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn clear(&mut self) {
        self.engines.clear();
    }
}

static GLOBAL: RwLock<Option<Arc<RwLock<EngineRegistry>>>> = RwLock::new(None);

/// Process-global engine registry.
///
/// Lazily initialized empty; startup code registers the configured
/// engines once. Reads are concurrent, writes are rare.
pub fn global_engine_registry() -> Arc<RwLock<EngineRegistry>> {
    if let Some(registry) = GLOBAL.read().as_ref() {
        return Arc::clone(registry);
    }
    let mut slot = GLOBAL.write();
    if let Some(registry) = slot.as_ref() {
        return Arc::clone(registry);
    }
    let registry = Arc::new(RwLock::new(EngineRegistry::new()));
    *slot = Some(Arc::clone(&registry));
    registry
}

/// Drop the global registry (tests).
pub fn reset_global_engine_registry() {
    *GLOBAL.write() = None;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
