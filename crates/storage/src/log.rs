// SPDX-License-Identifier: MIT

//! Append-only JSONL event log.
//!
//! The log is the durable `events` table: one JSON line per committed
//! event, `{"id":N,"ts_ms":T,"event":{...}}\n`, with ids assigned at
//! append time, strictly increasing and never reused. Writes go
//! straight through a buffered writer; only the fsync is deferred, so a
//! batch of commits pays for one disk sync (~10ms window).
//!
//! The log is never rewritten or rotated. A torn tail from a crash is
//! cut off in place: the bad bytes move to a `.corrupt` sidecar and the
//! file is truncated at the last whole record. Snapshots bound replay
//! time, not the audit trail, so SSE consumers can resume from any id
//! still on disk.

use dg_core::{Event, EventFilter, EventRecord};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// How long appended records may sit without an fsync.
const SYNC_WINDOW: Duration = Duration::from_millis(10);

/// Dirty-record count that forces an early fsync.
const SYNC_THRESHOLD: usize = 100;

/// Errors that can occur in event log operations
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What one pass over the file on disk found.
struct LogScan {
    /// Highest id among whole records.
    last_id: u64,
    /// Byte length of the whole-record prefix.
    valid_len: u64,
    /// Total file length (anything past `valid_len` is a torn tail).
    total_len: u64,
}

/// Append-only JSONL event log with deferred fsync.
pub struct EventLog {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Highest id assigned so far (0 when empty).
    last_id: u64,
    /// Records appended since the last fsync.
    dirty: usize,
    /// When the oldest un-synced record must hit disk.
    sync_deadline: Option<Instant>,
}

impl EventLog {
    /// Open or create an event log at the given path.
    ///
    /// Repairs a torn tail before the first append so the writer only
    /// ever extends a file of whole records.
    pub fn open(path: &Path) -> Result<Self, EventLogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let last_id = Self::repair(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_owned(),
            last_id,
            dirty: 0,
            sync_deadline: None,
        })
    }

    /// Scan the file and cut off a torn tail, if any.
    ///
    /// The valid prefix stays exactly where it is; the bad bytes are
    /// appended to a `.corrupt` sidecar for post-mortems and the file
    /// is truncated at the last whole record. Returns the highest id.
    fn repair(path: &Path) -> Result<u64, EventLogError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let scan = Self::scan(file)?;
        if scan.valid_len < scan.total_len {
            let sidecar = path.with_extension("corrupt");
            warn!(
                path = %path.display(),
                sidecar = %sidecar.display(),
                torn_bytes = scan.total_len - scan.valid_len,
                last_id = scan.last_id,
                "torn tail in event log, truncating at last whole record"
            );

            let mut reader = File::open(path)?;
            io::Seek::seek(&mut reader, io::SeekFrom::Start(scan.valid_len))?;
            let mut tail = Vec::with_capacity((scan.total_len - scan.valid_len) as usize);
            io::Read::read_to_end(&mut reader, &mut tail)?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&sidecar)?
                .write_all(&tail)?;

            let log = OpenOptions::new().write(true).open(path)?;
            log.set_len(scan.valid_len)?;
            log.sync_all()?;
        }

        Ok(scan.last_id)
    }

    /// One pass over a log file: highest id and length of the whole-
    /// record prefix. Stops at the first line that is not a complete
    /// record (torn write, partial JSON, or non-UTF8 garbage).
    fn scan(file: File) -> Result<LogScan, EventLogError> {
        let total_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut scan = LogScan {
            last_id: 0,
            valid_len: 0,
            total_len,
        };

        loop {
            line.clear();
            let bytes = match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            };
            // A record is whole when it parses AND carries its newline;
            // a crash mid-write can leave valid JSON with no terminator.
            if !line.ends_with('\n') {
                break;
            }
            let Ok(record) = serde_json::from_str::<EventRecord>(line.trim_end()) else {
                break;
            };
            scan.last_id = scan.last_id.max(record.id);
            scan.valid_len += bytes as u64;
        }

        Ok(scan)
    }

    /// Append an event, assigning the next id.
    ///
    /// The record goes to the OS immediately (readers see it after the
    /// next [`EventLog::publish`]) but is only crash-durable once
    /// [`EventLog::sync`] has run.
    pub fn append(&mut self, event: Event, ts_ms: u64) -> Result<EventRecord, EventLogError> {
        self.last_id += 1;
        let record = EventRecord {
            id: self.last_id,
            ts_ms,
            event,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.dirty += 1;
        self.sync_deadline
            .get_or_insert_with(|| Instant::now() + SYNC_WINDOW);
        Ok(record)
    }

    /// Hand buffered bytes to the OS so read handles observe them.
    /// Cheap; does not force anything to disk.
    fn publish(&mut self) -> Result<(), EventLogError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Whether the deferred fsync is owed: the oldest un-synced record
    /// has aged past the window, or enough have piled up.
    pub fn sync_due(&self) -> bool {
        self.dirty >= SYNC_THRESHOLD
            || self
                .sync_deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }

    /// Force everything appended so far onto disk. This is the
    /// durability point; a clean return means every assigned id
    /// survives a crash.
    pub fn sync(&mut self) -> Result<(), EventLogError> {
        if self.dirty == 0 {
            return Ok(());
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.dirty = 0;
        self.sync_deadline = None;
        Ok(())
    }

    /// Highest id assigned so far (0 when the log is empty).
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `limit` records with id greater than `since_id`,
    /// keeping only those matching `filter` (0 = no limit).
    ///
    /// Opens a fresh read cursor per call; concurrent tailers never
    /// share offsets. Publishes pending writes first so every assigned
    /// id is visible.
    pub fn read_after(
        &mut self,
        since_id: u64,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<EventRecord>, EventLogError> {
        self.publish()?;

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }
            // The writer repaired the file at open and is the only
            // appender since, so a parse failure can only be a racing
            // partial write at the very end; stop there.
            let Ok(record) = serde_json::from_str::<EventRecord>(line.trim_end()) else {
                break;
            };
            if record.id <= since_id || !filter.matches(&record.event) {
                continue;
            }
            records.push(record);
            if limit > 0 && records.len() >= limit {
                break;
            }
        }

        Ok(records)
    }

    /// Every record with id greater than `since_id` (replay path).
    pub fn entries_after(&mut self, since_id: u64) -> Result<Vec<EventRecord>, EventLogError> {
        self.read_after(since_id, &EventFilter::default(), 0)
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
