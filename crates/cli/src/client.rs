// SPDX-License-Identifier: MIT

//! Daemon client: connect, send one request, read one response.

use dg_daemon::protocol::{self, ProtocolError, Request, Response, DEFAULT_TIMEOUT};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::UnixStream;

/// Errors talking to the daemon
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running (socket {0} not found); start it with 'dgd'")]
    NotRunning(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Resolve the daemon socket the same way the daemon does.
pub fn socket_path() -> Result<PathBuf, dg_daemon::ConfigError> {
    Ok(dg_daemon::Config::load()?.socket_path())
}

/// Send one request and return the daemon's response.
pub async fn roundtrip(socket: &PathBuf, request: &Request) -> Result<Response, ClientError> {
    let stream = UnixStream::connect(socket)
        .await
        .map_err(|_| ClientError::NotRunning(socket.display().to_string()))?;
    let mut stream = BufReader::new(stream);

    protocol::send_frame(&mut stream, request, DEFAULT_TIMEOUT).await?;
    Ok(protocol::recv_frame(&mut stream, DEFAULT_TIMEOUT).await?)
}
