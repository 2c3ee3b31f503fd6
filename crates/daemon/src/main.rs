// SPDX-License-Identifier: MIT

//! dgd: the DevGodzilla daemon binary.

use dg_daemon::{lifecycle, listener, Config};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_path = config.log_path();
    match log_path.parent().map(std::fs::create_dir_all) {
        Some(Ok(())) => {
            let file = tracing_appender::rolling::never(
                log_path.parent().unwrap_or(std::path::Path::new(".")),
                log_path
                    .file_name()
                    .unwrap_or(std::ffi::OsStr::new("daemon.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dgd: configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let _log_guard = init_tracing(&config);

    let (state, socket) = match lifecycle::startup(config).await {
        Ok(started) => started,
        Err(lifecycle::LifecycleError::Config(e)) => {
            eprintln!("dgd: configuration error: {e}");
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("dgd: startup failed: {e}");
            return ExitCode::from(1);
        }
    };

    // Stdout handshake for supervisors and the CLI.
    println!("READY");

    let shutdown = Arc::new(Notify::new());
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("signal received, shutting down");
            signal_shutdown.notify_waiters();
        }
    });

    let result = listener::run(
        socket,
        Arc::clone(&state.api),
        shutdown,
        state.config.pool_size,
    )
    .await;
    lifecycle::shutdown(&state);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "listener failed");
            ExitCode::from(1)
        }
    }
}
