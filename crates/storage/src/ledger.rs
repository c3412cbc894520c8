// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL event ledger with synchronous subscriber fan-out.
//!
//! Each entry is a single line of JSON:
//! `{"seq":N,"ts":"...","task_id":...,"worker_id":"...","event":{...}}\n`
//!
//! Subscribers are notified before the entry is persisted, and `log` never
//! fails: a sink error is remembered and surfaced as a `meta:error` event on
//! the next `log` call, so the ledger never blocks execution on I/O.

use ov_core::{Clock, Event, TaskId, WorkerId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur opening or reading the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single ledger entry with sequence number and stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    /// ISO-8601 millisecond timestamp assigned at emission
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub worker_id: WorkerId,
    pub event: Event,
}

/// Counters reported by [`Ledger::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub events_logged: u64,
    pub uptime_ms: u64,
    pub dropped_chunks: u64,
}

type Handler = Box<dyn Fn(&LedgerEntry) + Send + Sync>;

struct Subscriber {
    /// `None` subscribes to every event kind
    kind: Option<String>,
    handler: Handler,
}

struct LedgerState {
    file: File,
    seq: u64,
    events_logged: u64,
    subscribers: Vec<Subscriber>,
    /// Sink failure waiting to be surfaced on the next `log`
    pending_error: Option<String>,
    /// Chunk entries whose persistence was skipped while the sink was unhealthy
    dropped_chunks: u64,
}

/// Append-only event ledger.
pub struct Ledger<C: Clock> {
    state: Mutex<LedgerState>,
    path: PathBuf,
    clock: C,
    opened_at: Instant,
}

impl<C: Clock> Ledger<C> {
    /// Open or create a ledger at the given path.
    ///
    /// Scans any existing file so sequence numbers continue monotonically
    /// across restarts.
    pub fn open(path: &Path, clock: C) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let seq = Self::scan_max_seq(&file)?;
        let opened_at = clock.now();

        Ok(Self {
            state: Mutex::new(LedgerState {
                file,
                seq,
                events_logged: 0,
                subscribers: Vec::new(),
                pending_error: None,
                dropped_chunks: 0,
            }),
            path: path.to_owned(),
            clock,
            opened_at,
        })
    }

    /// Find the highest sequence number already on disk.
    fn scan_max_seq(file: &File) -> Result<u64, LedgerError> {
        #[derive(Deserialize)]
        struct SeqOnly {
            seq: u64,
        }

        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut max_seq = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // A trailing partial line from a crash is skipped, not fatal
            match serde_json::from_str::<SeqOnly>(trimmed) {
                Ok(record) => max_seq = max_seq.max(record.seq),
                Err(_) => break,
            }
        }
        Ok(max_seq)
    }

    /// Register a handler.
    ///
    /// `kind` restricts delivery to one event name (e.g. `"task:completed"`);
    /// `None` receives everything. Delivery order for each subscriber equals
    /// emission order, and subscribers run in registration order.
    pub fn subscribe<F>(&self, kind: Option<&str>, handler: F)
    where
        F: Fn(&LedgerEntry) + Send + Sync + 'static,
    {
        self.state.lock().subscribers.push(Subscriber {
            kind: kind.map(|k| k.to_string()),
            handler: Box::new(handler),
        });
    }

    /// Append an event: stamp it, notify subscribers, then persist.
    ///
    /// Returns the assigned sequence number. Never fails; sink errors are
    /// deferred and reported as a `meta:error` event on the next call.
    pub fn log(&self, worker_id: &WorkerId, event: Event) -> u64 {
        let mut state = self.state.lock();

        if let Some(message) = state.pending_error.take() {
            let meta = Event::MetaError { message };
            self.process(&mut state, worker_id, meta, true);
        }

        self.process(&mut state, worker_id, event, true)
    }

    /// Append a raw stream chunk.
    ///
    /// Chunk persistence is the first thing dropped when the sink is
    /// unhealthy: subscribers still see the entry, but nothing is written and
    /// a single `meta:persistence_lag` event marks the degradation.
    pub fn log_chunk(&self, worker_id: &WorkerId, task_id: &TaskId, bytes: &str) -> u64 {
        let mut state = self.state.lock();

        let event = Event::StreamChunk {
            task_id: task_id.clone(),
            bytes: bytes.to_string(),
        };

        if state.pending_error.is_some() {
            state.dropped_chunks += 1;
            let seq = self.process(&mut state, worker_id, event, false);
            if state.dropped_chunks == 1 {
                let lag = Event::PersistenceLag { dropped: 1 };
                self.process(&mut state, worker_id, lag, false);
            }
            return seq;
        }

        self.process(&mut state, worker_id, event, true)
    }

    /// Stamp, deliver, and (optionally) persist one event under the lock.
    fn process(
        &self,
        state: &mut LedgerState,
        worker_id: &WorkerId,
        event: Event,
        persist: bool,
    ) -> u64 {
        state.seq += 1;
        let entry = LedgerEntry {
            seq: state.seq,
            ts: self.clock.iso_now(),
            task_id: event.task_id().cloned(),
            worker_id: worker_id.clone(),
            event,
        };

        for sub in &state.subscribers {
            let wanted = match &sub.kind {
                None => true,
                Some(kind) => kind == entry.event.name(),
            };
            if wanted {
                (sub.handler)(&entry);
            }
        }

        state.events_logged += 1;

        if persist {
            if let Err(e) = Self::write_entry(&mut state.file, &entry) {
                warn!(path = %self.path.display(), error = %e, "ledger sink write failed");
                state.pending_error = Some(e.to_string());
            }
        }

        entry.seq
    }

    fn write_entry(file: &mut File, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut json = serde_json::to_vec(entry)?;
        json.push(b'\n');
        file.write_all(&json)?;
        file.flush()?;
        Ok(())
    }

    /// Events emitted and lifetime so far.
    pub fn stats(&self) -> LedgerStats {
        let state = self.state.lock();
        LedgerStats {
            events_logged: state.events_logged,
            uptime_ms: self.clock.now().duration_since(self.opened_at).as_millis() as u64,
            dropped_chunks: state.dropped_chunks,
        }
    }

    /// Read every entry currently on disk (test and replay helper).
    pub fn read_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.state.lock();
        let mut reader = BufReader::new(state.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEntry>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(error = %e, "corrupt ledger entry, stopping read");
                    break;
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
