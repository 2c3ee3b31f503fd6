// SPDX-License-Identifier: MIT

//! Job log access: bounded reads and byte-offset tail streaming.
//!
//! Logs stream by byte offset rather than event id: consumers supply
//! `since_bytes` (`Last-Event-ID` on the HTTP side) and receive
//! `event: log` frames carrying `{offset, chunk}` with `id:` set to the
//! new offset. Truncation (size < offset) restarts from 0.

use serde::Serialize;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Chunk cap per frame.
pub const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Hard cap for one-shot log reads.
pub const MAX_LOG_READ_BYTES: usize = 2_000_000;

/// Idle time between heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Poll cadence while tailing.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct LogChunk<'a> {
    offset: u64,
    chunk: &'a str,
}

/// Bounded one-shot read of a log's tail.
///
/// Returns `(content, truncated)`: when the file exceeds `max_bytes`,
/// only the trailing bytes are returned and `truncated` is true.
pub fn read_log_tail(path: &Path, max_bytes: usize) -> std::io::Result<(String, bool)> {
    let max_bytes = if max_bytes == 0 {
        MAX_LOG_READ_BYTES
    } else {
        max_bytes.min(MAX_LOG_READ_BYTES)
    };

    let mut file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let truncated = size > max_bytes as u64;
    if truncated {
        file.seek(SeekFrom::End(-(max_bytes as i64)))?;
    }
    let mut buffer = Vec::with_capacity(max_bytes.min(size as usize));
    file.take(max_bytes as u64).read_to_end(&mut buffer)?;
    Ok((String::from_utf8_lossy(&buffer).into_owned(), truncated))
}

/// Options for log tail streams.
#[derive(Debug, Clone)]
pub struct LogStreamOptions {
    pub heartbeat: Duration,
    pub poll_interval: Duration,
    pub max_chunk_bytes: usize,
    /// Stop after this many log frames (0 = run forever).
    pub max_chunks: usize,
}

impl Default for LogStreamOptions {
    fn default() -> Self {
        Self {
            heartbeat: HEARTBEAT_INTERVAL,
            poll_interval: POLL_INTERVAL,
            max_chunk_bytes: MAX_CHUNK_BYTES,
            max_chunks: 0,
        }
    }
}

/// Stream a log file to `writer` as SSE frames, starting at
/// `since_bytes`.
pub async fn stream_log<W>(
    path: &Path,
    writer: &mut W,
    since_bytes: u64,
    options: LogStreamOptions,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"event: connected\ndata: {}\n\n").await?;
    writer.flush().await?;

    let mut offset = since_bytes;
    let mut sent = 0usize;
    let mut idle = Duration::ZERO;

    loop {
        let chunk = match std::fs::metadata(path) {
            Ok(metadata) => {
                let size = metadata.len();
                // Truncated (rotated) files restart from the top.
                if size < offset {
                    offset = 0;
                }
                if size > offset {
                    let mut file = std::fs::File::open(path)?;
                    file.seek(SeekFrom::Start(offset))?;
                    let mut buffer = vec![0u8; options.max_chunk_bytes];
                    let read = file.read(&mut buffer)?;
                    buffer.truncate(read);
                    Some(buffer)
                } else {
                    None
                }
            }
            Err(_) => None,
        };

        match chunk {
            Some(bytes) if !bytes.is_empty() => {
                idle = Duration::ZERO;
                offset += bytes.len() as u64;
                let text = String::from_utf8_lossy(&bytes);
                let payload = serde_json::to_string(&LogChunk {
                    offset,
                    chunk: &text,
                })
                .unwrap_or_else(|_| "{}".to_string());
                let frame = format!("id: {offset}\nevent: log\ndata: {payload}\n\n");
                writer.write_all(frame.as_bytes()).await?;
                writer.flush().await?;

                sent += 1;
                if options.max_chunks > 0 && sent >= options.max_chunks {
                    return Ok(());
                }
            }
            _ => {
                idle += options.poll_interval;
                if idle >= options.heartbeat {
                    idle = Duration::ZERO;
                    writer.write_all(b": heartbeat\n\n").await?;
                    writer.flush().await?;
                }
                tokio::time::sleep(options.poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
