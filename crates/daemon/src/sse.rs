// SPDX-License-Identifier: MIT

//! SSE fan-out over the durable event log.
//!
//! Consumers supply a `since_id` watermark (`Last-Event-ID` on the HTTP
//! side) and receive every later event exactly once, in commit order:
//!
//! ```text
//! id: <monotonic>\n
//! event: <event_type>\n
//! data: <json>\n\n
//! ```
//!
//! A `connected` sentinel opens the stream and `: heartbeat\n\n`
//! comments keep idle connections alive. The frames are written to any
//! `AsyncWrite`; the HTTP facade splices them into its response body.

use dg_core::{Clock, EventFilter, EventRecord};
use dg_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Events per poll; readers batch at most this many per wakeup.
pub const EVENT_BATCH_SIZE: usize = 200;

/// Idle time between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Tuning knobs for an event stream.
#[derive(Debug, Clone)]
pub struct EventStreamOptions {
    pub filter: EventFilter,
    pub heartbeat: Duration,
    /// Stop after this many frames (0 = run until the client goes
    /// away). Tests bound streams with it.
    pub max_events: usize,
}

impl Default for EventStreamOptions {
    fn default() -> Self {
        Self {
            filter: EventFilter::default(),
            heartbeat: HEARTBEAT_INTERVAL,
            max_events: 0,
        }
    }
}

/// Format one event as an SSE frame.
pub fn event_frame(record: &EventRecord) -> String {
    let data = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    format!(
        "id: {}\nevent: {}\ndata: {}\n\n",
        record.id,
        record.event.name(),
        data
    )
}

/// The opening sentinel frame.
pub fn connected_frame() -> &'static str {
    "event: connected\ndata: {}\n\n"
}

/// The heartbeat comment frame.
pub fn heartbeat_frame() -> &'static str {
    ": heartbeat\n\n"
}

/// Stream events with id greater than `since_id` to `writer`.
///
/// Runs until the writer errors (client disconnect) or `max_events`
/// frames have been sent. Resumption is lossless: reconnecting with the
/// last delivered id yields zero duplicates.
pub async fn stream_events<C, W>(
    store: Arc<Store<C>>,
    writer: &mut W,
    since_id: u64,
    options: EventStreamOptions,
) -> std::io::Result<()>
where
    C: Clock,
    W: AsyncWrite + Unpin,
{
    writer.write_all(connected_frame().as_bytes()).await?;
    writer.flush().await?;

    let mut watermark = since_id;
    let mut sent = 0usize;
    let mut last_id_rx = store.watch_last_event_id();

    loop {
        let records = store
            .events_after(watermark, &options.filter, EVENT_BATCH_SIZE)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        for record in &records {
            writer.write_all(event_frame(record).as_bytes()).await?;
            watermark = record.id;
            sent += 1;
            if options.max_events > 0 && sent >= options.max_events {
                writer.flush().await?;
                return Ok(());
            }
        }
        if !records.is_empty() {
            writer.flush().await?;
            continue;
        }

        // Idle: sleep until a commit or the heartbeat timer.
        let woke = tokio::time::timeout(options.heartbeat, last_id_rx.changed()).await;
        match woke {
            Ok(Ok(())) => {
                debug!(watermark, "event stream woke on new commit");
            }
            Ok(Err(_)) => {
                // Store dropped; drain whatever is left, then stop.
                return Ok(());
            }
            Err(_) => {
                writer.write_all(heartbeat_frame().as_bytes()).await?;
                writer.flush().await?;
            }
        }
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
