// SPDX-License-Identifier: MIT

//! Central registry for QA gates.
//!
//! Gates are registered by id and grouped by category. Evaluation
//! never short-circuits: disabled gates yield `skip`, and a gate error
//! becomes an `error` result rather than aborting the pipeline.

use crate::gate::{Gate, GateContext};
use crate::gates::{
    AntiAbstractionGate, ChecklistGate, CoverageGate, FormatGate, LibraryFirstGate, LintGate,
    SecurityGate, SimplicityGate, TestFirstGate, TestGate, TypeGate,
};
use dg_core::GateOutcome;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Registry of gates by id, grouped by category.
#[derive(Default)]
pub struct GateRegistry {
    gates: IndexMap<String, Arc<dyn Gate>>,
    categories: IndexMap<String, Vec<String>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gate under a category. Re-registering an id replaces
    /// the gate and moves it to the new category.
    pub fn register(&mut self, gate: Arc<dyn Gate>, category: &str) {
        let gate_id = gate.gate_id().to_string();
        if self.gates.contains_key(&gate_id) {
            warn!(gate_id = %gate_id, category, "overwriting registered gate");
            for ids in self.categories.values_mut() {
                ids.retain(|id| id != &gate_id);
            }
        }
        self.gates.insert(gate_id.clone(), gate);
        let ids = self.categories.entry(category.to_string()).or_default();
        if !ids.contains(&gate_id) {
            ids.push(gate_id.clone());
        }
        debug!(gate_id = %gate_id, category, "gate registered");
    }

    /// Remove a gate. Returns it if it was registered.
    pub fn unregister(&mut self, gate_id: &str) -> Option<Arc<dyn Gate>> {
        let gate = self.gates.shift_remove(gate_id);
        if gate.is_some() {
            for ids in self.categories.values_mut() {
                ids.retain(|id| id != gate_id);
            }
            debug!(gate_id, "gate unregistered");
        }
        gate
    }

    pub fn get(&self, gate_id: &str) -> Option<Arc<dyn Gate>> {
        self.gates.get(gate_id).cloned()
    }

    pub fn has(&self, gate_id: &str) -> bool {
        self.gates.contains_key(gate_id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.gates.keys().cloned().collect()
    }

    pub fn list_by_category(&self, category: &str) -> Vec<Arc<dyn Gate>> {
        self.categories
            .get(category)
            .map(|ids| ids.iter().filter_map(|id| self.gates.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Evaluate every registered gate, in registration order.
    pub fn evaluate_all(&self, ctx: &GateContext) -> Vec<GateOutcome> {
        let ids = self.list_ids();
        self.evaluate_gates(&ids, ctx)
    }

    /// Evaluate the gates of one category.
    pub fn evaluate_category(&self, category: &str, ctx: &GateContext) -> Vec<GateOutcome> {
        let ids: Vec<String> = self
            .categories
            .get(category)
            .cloned()
            .unwrap_or_default();
        self.evaluate_gates(&ids, ctx)
    }

    /// Evaluate specific gates by id.
    ///
    /// Unknown ids are logged and skipped; a disabled gate yields a
    /// `skip` result; a gate returning an error yields an `error`
    /// result. Nothing here aborts the remaining gates.
    pub fn evaluate_gates(&self, gate_ids: &[String], ctx: &GateContext) -> Vec<GateOutcome> {
        let mut outcomes = Vec::with_capacity(gate_ids.len());

        for gate_id in gate_ids {
            let Some(gate) = self.gates.get(gate_id) else {
                warn!(gate_id, "gate not found, skipping");
                continue;
            };

            if !gate.enabled() {
                outcomes.push(gate.skip_outcome("gate disabled"));
                continue;
            }

            let start = Instant::now();
            let mut outcome = match gate.run(ctx) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(gate_id, error = %e, "gate evaluation failed");
                    gate.error_outcome(&e.to_string())
                }
            };
            if outcome.duration_ms == 0 {
                outcome.duration_ms = start.elapsed().as_millis() as u64;
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    pub fn clear(&mut self) {
        self.gates.clear();
        self.categories.clear();
    }
}

/// Build a registry with the default gates registered.
///
/// `include` (when given) whitelists gate ids; `exclude` removes ids
/// after that.
pub fn create_default_registry(
    include: Option<&[String]>,
    exclude: &[String],
) -> GateRegistry {
    let mut registry = GateRegistry::new();

    let defaults: Vec<(Arc<dyn Gate>, &str)> = vec![
        (Arc::new(TestGate::default()), "testing"),
        (Arc::new(LintGate::default()), "code_quality"),
        (Arc::new(TypeGate::default()), "type_safety"),
        (Arc::new(ChecklistGate::default()), "validation"),
        (Arc::new(FormatGate::default()), "code_quality"),
        (Arc::new(CoverageGate::default()), "testing"),
        (Arc::new(SecurityGate::default()), "security"),
        (Arc::new(LibraryFirstGate::default()), "constitutional"),
        (Arc::new(SimplicityGate::default()), "constitutional"),
        (Arc::new(AntiAbstractionGate::default()), "constitutional"),
        (Arc::new(TestFirstGate::default()), "constitutional"),
    ];

    for (gate, category) in defaults {
        if let Some(include) = include {
            if !include.iter().any(|id| id == gate.gate_id()) {
                continue;
            }
        }
        if exclude.iter().any(|id| id == gate.gate_id()) {
            continue;
        }
        registry.register(gate, category);
    }

    registry
}

static GLOBAL: RwLock<Option<Arc<RwLock<GateRegistry>>>> = RwLock::new(None);

/// Process-global registry, lazily initialized with the defaults.
///
/// Registration is infrequent; readers take the lock briefly per
/// evaluation batch.
pub fn global_registry() -> Arc<RwLock<GateRegistry>> {
    if let Some(registry) = GLOBAL.read().as_ref() {
        return Arc::clone(registry);
    }
    let mut slot = GLOBAL.write();
    if let Some(registry) = slot.as_ref() {
        return Arc::clone(registry);
    }
    let registry = Arc::new(RwLock::new(create_default_registry(None, &[])));
    *slot = Some(Arc::clone(&registry));
    registry
}

/// Drop the global registry so the next access re-initializes.
/// Test-only in spirit; production initializes once at startup.
pub fn reset_global_registry() {
    *GLOBAL.write() = None;
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
