// SPDX-License-Identifier: MIT

//! In-process event bus.
//!
//! Carries committed event records to subscribers. The durable write
//! happens in the store before publication; the bus is pure fan-out.
//! Handler panics are contained and never reach the publisher.

use dg_core::EventRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

type Handler = Arc<dyn Fn(&EventRecord) + Send + Sync>;

/// Publish/subscribe fan-out for committed events.
pub struct EventBus {
    any: RwLock<Vec<Handler>>,
    by_type: RwLock<HashMap<String, Vec<Handler>>>,
    async_tx: RwLock<Option<mpsc::UnboundedSender<EventRecord>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            any: RwLock::new(Vec::new()),
            by_type: RwLock::new(HashMap::new()),
            async_tx: RwLock::new(None),
        }
    }

    /// Subscribe to every event.
    pub fn subscribe_any(&self, handler: impl Fn(&EventRecord) + Send + Sync + 'static) {
        self.any.write().push(Arc::new(handler));
    }

    /// Subscribe to one event type (the serde tag, e.g. "qa_evaluated").
    pub fn subscribe(
        &self,
        event_type: &str,
        handler: impl Fn(&EventRecord) + Send + Sync + 'static,
    ) {
        self.by_type
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    fn handlers_for(&self, record: &EventRecord) -> Vec<Handler> {
        let mut handlers: Vec<Handler> = self.any.read().iter().cloned().collect();
        if let Some(typed) = self.by_type.read().get(record.event.name()) {
            handlers.extend(typed.iter().cloned());
        }
        handlers
    }

    /// Fan out on the caller's execution context.
    ///
    /// Handlers run in subscription order; a panicking handler is logged
    /// and the rest still run.
    pub fn publish(&self, record: &EventRecord) {
        for handler in self.handlers_for(record) {
            if catch_unwind(AssertUnwindSafe(|| handler(record))).is_err() {
                error!(
                    event = record.event.name(),
                    id = record.id,
                    "event handler panicked"
                );
            }
        }
    }

    /// Fan out on the dispatcher task, preserving publication order.
    ///
    /// Requires [`EventBus::start_dispatcher`] to have run; falls back
    /// to synchronous dispatch otherwise.
    pub fn publish_async(&self, record: EventRecord) {
        let sent = {
            let tx = self.async_tx.read();
            match tx.as_ref() {
                Some(tx) => tx.send(record.clone()).is_ok(),
                None => false,
            }
        };
        if !sent {
            warn!("async dispatcher not running, publishing synchronously");
            self.publish(&record);
        }
    }

    /// Spawn the ordered async dispatcher on the current runtime.
    pub fn start_dispatcher(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<EventRecord>();
        *self.async_tx.write() = Some(tx);
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                bus.publish(&record);
            }
        });
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
