// SPDX-License-Identifier: MIT

//! Daemon lifecycle: startup, background timers, shutdown.
//!
//! Startup order: state dir + exclusive lock, store (snapshot +
//! replay), adapters, orchestrator, stuck-run recovery, listener
//! socket. Shutdown runs in reverse and ends with a final checkpoint.

use crate::env::{Config, ConfigError};
use crate::health::HealthChecker;
use crate::listener::Api;
use dg_adapters::engine::{
    global_engine_registry, CliEngine, EngineKind, EngineMetadata, EngineRegistry,
};
use dg_adapters::{ExecutorAdapter, TracedExecutor, WindmillConfig, WindmillExecutor};
use dg_core::SystemClock;
use dg_engine::{
    EventBus, Orchestrator, OrchestratorConfig, ReconciliationReport, ReconciliationService,
};
use dg_quality::global_registry;
use dg_storage::{Store, StoreError, StorePaths};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Group-commit flush cadence.
const FLUSH_INTERVAL: Duration = Duration::from_millis(20);

/// Snapshot cadence.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(300);

/// Errors during daemon startup/shutdown
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("another daemon is already running (lock held)")]
    AlreadyRunning,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("executor error: {0}")]
    Executor(String),
}

/// Running daemon state.
pub struct DaemonState {
    pub config: Config,
    pub store: Arc<Store<SystemClock>>,
    pub api: Arc<Api<SystemClock>>,
    pub bus: Arc<EventBus>,
    pub start_time: Instant,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl std::fmt::Debug for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonState")
            .field("config", &self.config)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

/// Register the stock CLI engines. Availability is probed lazily at
/// dispatch time, so unknown binaries cost nothing here.
fn register_default_engines(registry: &RwLock<EngineRegistry>) {
    let engines: Vec<CliEngine> = vec![
        CliEngine::new(
            EngineMetadata::new("opencode", "OpenCode CLI", EngineKind::Cli)
                .with_capability("code_gen")
                .with_capability("qa"),
            "opencode",
        )
        .with_args(vec!["run".into()]),
        CliEngine::new(
            EngineMetadata::new("claude", "Claude Code CLI", EngineKind::Cli)
                .with_capability("code_gen")
                .with_capability("qa")
                .with_capability("planning"),
            "claude",
        )
        .with_args(vec!["-p".into()])
        .with_model_flag("--model"),
        CliEngine::new(
            EngineMetadata::new("codex", "Codex CLI", EngineKind::Cli)
                .with_capability("code_gen"),
            "codex",
        )
        .with_args(vec!["exec".into()]),
    ];
    let mut registry = registry.write();
    for engine in engines {
        registry.register(Arc::new(engine));
    }
}

/// Bring the daemon up. Returns the state and the bound socket.
pub async fn startup(config: Config) -> Result<(DaemonState, UnixListener), LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Exclusive pid-file lock: one daemon per state directory.
    let mut lock_file = File::create(config.lock_path())?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::AlreadyRunning)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let store = Arc::new(Store::open(&StorePaths::under(&config.state_dir))?);
    info!(
        last_event_id = store.last_event_id(),
        "store opened (snapshot + replay)"
    );

    let executor: Option<Arc<dyn ExecutorAdapter>> = match config.windmill.as_ref() {
        Some(settings) => {
            let windmill = WindmillExecutor::new(WindmillConfig {
                base_url: settings.url.clone(),
                workspace: settings.workspace.clone(),
                token: settings.token.clone(),
            })
            .map_err(|e| LifecycleError::Executor(e.to_string()))?;
            Some(Arc::new(TracedExecutor::new(windmill)))
        }
        None => None,
    };

    let engines = global_engine_registry();
    if engines.read().is_empty() {
        register_default_engines(&engines);
    }
    let gates = global_registry();

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&engines),
        Arc::clone(&gates),
        executor.clone(),
        OrchestratorConfig {
            dispatch_mode: config.dispatch_mode(),
            default_engine_id: config.default_engine_id.clone(),
            engine_timeout: config.engine_timeout,
            qa_direct_complete: config.qa_direct_complete,
            qa_max_auto_fix_attempts: config.qa_max_auto_fix_attempts,
            logs_dir: config.logs_dir(),
            ..Default::default()
        },
    );

    let reconciliation = Arc::new(ReconciliationService::new(
        Arc::clone(&store),
        executor.clone(),
    ));
    let health = Arc::new(HealthChecker::new(
        Arc::clone(&store),
        executor,
        Arc::clone(&engines),
    ));
    let last_report: Arc<Mutex<Option<ReconciliationReport>>> = Arc::new(Mutex::new(None));

    // Event bus: ordered async dispatcher plus a pump that publishes
    // every committed record.
    let bus = Arc::new(EventBus::new());
    bus.subscribe_any(|record| {
        tracing::debug!(id = record.id, "{}", record.event.log_summary());
    });
    bus.start_dispatcher();
    spawn_bus_pump(Arc::clone(&bus), Arc::clone(&store));

    // Recover runs stuck from before the restart.
    match orchestrator.recover_stuck_protocols() {
        Ok(outcomes) if !outcomes.is_empty() => {
            info!(count = outcomes.len(), "recovered stuck protocols");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "stuck-protocol recovery failed"),
    }

    let api = Arc::new(Api {
        orchestrator,
        reconciliation: Arc::clone(&reconciliation),
        health,
        last_report: Arc::clone(&last_report),
    });

    spawn_flush_timer(Arc::clone(&store));
    spawn_checkpoint_timer(Arc::clone(&store));
    spawn_reconcile_timer(reconciliation, last_report, config.reconcile_interval);

    // Bind the socket last: a visible socket means a serving daemon.
    let socket_path = config.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "daemon ready");

    Ok((
        DaemonState {
            config,
            store,
            api,
            bus,
            start_time: Instant::now(),
            lock_file,
        },
        listener,
    ))
}

/// Publish committed events onto the bus, in commit order.
fn spawn_bus_pump(bus: Arc<EventBus>, store: Arc<Store<SystemClock>>) {
    let mut rx = store.watch_last_event_id();
    let mut published = store.last_event_id();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let records = match store.events_after(published, &Default::default(), 0) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "bus pump read failed");
                    continue;
                }
            };
            for record in records {
                published = record.id;
                bus.publish(&record);
            }
        }
    });
}

fn spawn_flush_timer(store: Arc<Store<SystemClock>>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tick.tick().await;
            if let Err(e) = store.maybe_flush() {
                warn!(error = %e, "group-commit flush failed");
            }
        }
    });
}

fn spawn_checkpoint_timer(store: Arc<Store<SystemClock>>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(CHECKPOINT_INTERVAL);
        tick.tick().await; // skip the immediate first tick
        loop {
            tick.tick().await;
            match store.start_checkpoint() {
                Ok(handle) => {
                    let result = tokio::task::spawn_blocking(move || handle.wait()).await;
                    match result {
                        Ok(Ok(result)) => info!(
                            last_event_id = result.last_event_id,
                            size_bytes = result.size_bytes,
                            "checkpoint complete"
                        ),
                        Ok(Err(e)) => warn!(error = %e, "checkpoint failed"),
                        Err(e) => warn!(error = %e, "checkpoint task failed"),
                    }
                }
                Err(e) => warn!(error = %e, "checkpoint start failed"),
            }
        }
    });
}

fn spawn_reconcile_timer(
    reconciliation: Arc<ReconciliationService<SystemClock>>,
    last_report: Arc<Mutex<Option<ReconciliationReport>>>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.tick().await; // skip the immediate first tick
        loop {
            tick.tick().await;
            match reconciliation.reconcile_runs(None, false).await {
                Ok(report) => {
                    if report.mismatches_found > 0 {
                        info!(
                            auto_fixed = report.auto_fixed,
                            requires_manual = report.requires_manual,
                            "periodic reconciliation found drift"
                        );
                    }
                    *last_report.lock() = Some(report);
                }
                Err(e) => warn!(error = %e, "periodic reconciliation failed"),
            }
        }
    });
}

/// Graceful shutdown: flush, final checkpoint, remove the socket.
pub fn shutdown(state: &DaemonState) {
    if let Err(e) = state.store.flush() {
        warn!(error = %e, "final flush failed");
    }
    if let Err(e) = state.store.checkpoint_now() {
        warn!(error = %e, "final checkpoint failed");
    }
    let _ = std::fs::remove_file(state.config.socket_path());
    let _ = std::fs::remove_file(state.config.lock_path());
    info!("daemon stopped");
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
