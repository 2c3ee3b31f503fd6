// SPDX-License-Identifier: MIT

//! Liveness and readiness checks.

use dg_adapters::engine::EngineRegistry;
use dg_adapters::ExecutorAdapter;
use dg_core::Clock;
use dg_storage::Store;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// One component's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".into(),
            message: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn failed(message: String, latency_ms: u64) -> Self {
        Self {
            status: "failed".into(),
            message: Some(message),
            latency_ms: Some(latency_ms),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Component-level readiness breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    /// "ready" or "degraded"
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
    pub checks_passed: usize,
    pub checks_failed: usize,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Runs the readiness probes.
pub struct HealthChecker<C: Clock> {
    store: Arc<Store<C>>,
    executor: Option<Arc<dyn ExecutorAdapter>>,
    engines: Arc<RwLock<EngineRegistry>>,
}

impl<C: Clock> HealthChecker<C> {
    pub fn new(
        store: Arc<Store<C>>,
        executor: Option<Arc<dyn ExecutorAdapter>>,
        engines: Arc<RwLock<EngineRegistry>>,
    ) -> Self {
        Self {
            store,
            executor,
            engines,
        }
    }

    /// Liveness: always "ok" while the process answers.
    pub fn liveness(&self) -> &'static str {
        "ok"
    }

    /// Readiness: store invariants, executor (when enabled), and the
    /// engine registry.
    pub async fn readiness(&self) -> ReadinessReport {
        let mut components = BTreeMap::new();

        let start = Instant::now();
        let store_health = match self.store.check_invariants() {
            Ok(()) => ComponentHealth::ok(start.elapsed().as_millis() as u64),
            Err(e) => ComponentHealth::failed(e.to_string(), start.elapsed().as_millis() as u64),
        };
        components.insert("store".to_string(), store_health);

        if let Some(executor) = self.executor.as_ref() {
            let start = Instant::now();
            let health = match executor.health_check().await {
                Ok(()) => ComponentHealth::ok(start.elapsed().as_millis() as u64),
                Err(e) => {
                    ComponentHealth::failed(e.to_string(), start.elapsed().as_millis() as u64)
                }
            };
            components.insert("executor".to_string(), health);
        }

        let start = Instant::now();
        let engine_count = self.engines.read().len();
        let engines_health = if engine_count > 0 {
            ComponentHealth::ok(start.elapsed().as_millis() as u64)
        } else {
            ComponentHealth::failed(
                "no engines registered".into(),
                start.elapsed().as_millis() as u64,
            )
        };
        components.insert("engines".to_string(), engines_health);

        let checks_passed = components.values().filter(|c| c.is_ok()).count();
        let checks_failed = components.len() - checks_passed;
        ReadinessReport {
            status: if checks_failed == 0 {
                "ready".into()
            } else {
                "degraded".into()
            },
            components,
            checks_passed,
            checks_failed,
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
