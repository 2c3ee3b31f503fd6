// SPDX-License-Identifier: MIT

//! Unix socket listener: accepts connections and dispatches requests
//! to the API layer.

mod api;

pub use api::Api;

use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT};
use dg_core::Clock;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, info, warn};

/// Accept loop. Returns when a `Shutdown` request arrives or the
/// `shutdown` notifier fires (signal handler).
///
/// `max_connections` bounds in-flight request handling, and with it the
/// concurrency hitting the store (the `DEVGODZILLA_DB_POOL_SIZE` knob).
pub async fn run<C: Clock>(
    listener: UnixListener,
    api: Arc<Api<C>>,
    shutdown: Arc<Notify>,
    max_connections: usize,
) -> std::io::Result<()> {
    info!(max_connections, "listener accepting connections");
    let permits = Arc::new(Semaphore::new(max_connections.max(1)));
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _addr) = accepted?;
                let api = Arc::clone(&api);
                let shutdown = Arc::clone(&shutdown);
                let permits = Arc::clone(&permits);
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire().await else {
                        return;
                    };
                    if let Err(e) = handle_connection(stream, api, shutdown).await {
                        debug!(error = %e, "connection ended");
                    }
                });
            }
        }
    }
}

async fn handle_connection<C: Clock>(
    stream: UnixStream,
    api: Arc<Api<C>>,
    shutdown: Arc<Notify>,
) -> Result<(), protocol::ProtocolError> {
    // Line-framed JSON both ways; the BufReader passes writes through.
    let mut stream = tokio::io::BufReader::new(stream);
    loop {
        let request = match protocol::read_request(&mut stream, DEFAULT_TIMEOUT).await {
            Ok(request) => request,
            Err(protocol::ProtocolError::ConnectionClosed) => return Ok(()),
            Err(protocol::ProtocolError::Timeout) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "bad request");
                return Err(e);
            }
        };

        if matches!(request, Request::Shutdown) {
            protocol::write_response(&mut stream, &Response::ShuttingDown, DEFAULT_TIMEOUT)
                .await?;
            shutdown.notify_waiters();
            return Ok(());
        }

        let response = api.handle(request).await;
        protocol::write_response(&mut stream, &response, DEFAULT_TIMEOUT).await?;
    }
}
