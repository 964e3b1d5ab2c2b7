// SPDX-License-Identifier: MIT

//! Log bus: per-job ring buffer, durable append, live fan-out.
//!
//! Appends assign a per-job monotonic sequence, land in a bounded ring
//! (late subscribers get history), buffer into the job's log file, and
//! fan out to subscribers over bounded channels. A subscriber that cannot
//! keep up is disconnected with its overflow flag set; the writer never
//! blocks on a slow reader.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use joblet_core::{JobId, LogChannel, LogRecord};

/// Default in-memory ring capacity, in records.
pub const DEFAULT_RING_CAPACITY: usize = 4096;

/// Per-subscriber channel depth.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

/// A live subscription handle.
pub struct LogSubscription {
    /// History already in the ring at subscribe time, `seq >=
    /// from_sequence`, oldest first.
    pub backlog: Vec<Arc<LogRecord>>,
    /// Live records after the backlog; closes on job close or overflow.
    pub rx: mpsc::Receiver<Arc<LogRecord>>,
    /// Set when this subscriber was dropped for falling behind.
    pub overflowed: Arc<AtomicBool>,
}

struct Subscriber {
    tx: mpsc::Sender<Arc<LogRecord>>,
    overflowed: Arc<AtomicBool>,
}

struct JobLog {
    next_seq: u64,
    ring: VecDeque<Arc<LogRecord>>,
    writer: Option<BufWriter<File>>,
    subscribers: Vec<Subscriber>,
    dirty: bool,
}

impl JobLog {
    fn new(writer: Option<BufWriter<File>>) -> Self {
        Self {
            next_seq: 0,
            ring: VecDeque::new(),
            writer,
            subscribers: Vec::new(),
            dirty: false,
        }
    }
}

/// The per-job pub-sub fabric.
pub struct LogBus {
    logs_dir: PathBuf,
    ring_capacity: usize,
    jobs: Mutex<HashMap<JobId, JobLog>>,
}

impl LogBus {
    pub fn new(logs_dir: PathBuf, ring_capacity: usize) -> Self {
        Self {
            logs_dir,
            ring_capacity,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn log_path(&self, job_id: &JobId) -> PathBuf {
        self.logs_dir.join(format!("{job_id}.log"))
    }

    fn open_writer(&self, job_id: &JobId) -> Option<BufWriter<File>> {
        if let Err(e) = std::fs::create_dir_all(&self.logs_dir) {
            tracing::warn!(error = %e, "cannot create logs dir");
            return None;
        }
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(job_id))
        {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "cannot open log file");
                None
            }
        }
    }

    /// Append a record, assign its sequence, fan out. Returns the sequence.
    pub fn append(
        &self,
        job_id: &JobId,
        channel: LogChannel,
        message: impl Into<String>,
        ts_ms: u64,
    ) -> u64 {
        let mut jobs = self.jobs.lock();
        let entry = jobs
            .entry(job_id.clone())
            .or_insert_with(|| JobLog::new(self.open_writer(job_id)));

        let record = Arc::new(LogRecord {
            job_id: job_id.clone(),
            seq: entry.next_seq,
            ts_ms,
            channel,
            message: message.into(),
        });
        entry.next_seq += 1;

        // Durable append (buffered; flushed on interval or close).
        if let Some(writer) = entry.writer.as_mut() {
            match serde_json::to_vec(record.as_ref()) {
                Ok(mut line) => {
                    line.push(b'\n');
                    if let Err(e) = writer.write_all(&line) {
                        tracing::warn!(job_id = %job_id, error = %e, "log file write failed");
                    } else {
                        entry.dirty = true;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "log record serialization failed"),
            }
        }

        // Ring.
        if entry.ring.len() == self.ring_capacity {
            entry.ring.pop_front();
        }
        entry.ring.push_back(Arc::clone(&record));

        // Fan out; drop subscribers that are full.
        entry.subscribers.retain(|sub| {
            match sub.tx.try_send(Arc::clone(&record)) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.overflowed.store(true, Ordering::SeqCst);
                    tracing::debug!(job_id = %record.job_id, "slow log subscriber dropped");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        record.seq
    }

    /// Subscribe to a job's records.
    ///
    /// `from_sequence >= 0` first delivers ring history with `seq >=
    /// from_sequence`; `-1` tails live records only. Registration and the
    /// backlog snapshot happen under one lock, so the transition from
    /// backlog to live is gap-free.
    pub fn subscribe(&self, job_id: &JobId, from_sequence: i64) -> LogSubscription {
        let mut jobs = self.jobs.lock();
        let entry = jobs
            .entry(job_id.clone())
            .or_insert_with(|| JobLog::new(self.open_writer(job_id)));

        let backlog = if from_sequence < 0 {
            Vec::new()
        } else {
            entry
                .ring
                .iter()
                .filter(|rec| rec.seq >= from_sequence as u64)
                .cloned()
                .collect()
        };

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let overflowed = Arc::new(AtomicBool::new(false));
        entry.subscribers.push(Subscriber {
            tx,
            overflowed: Arc::clone(&overflowed),
        });

        LogSubscription {
            backlog,
            rx,
            overflowed,
        }
    }

    /// Flush one job's buffered file writes.
    pub fn flush(&self, job_id: &JobId) {
        let mut jobs = self.jobs.lock();
        if let Some(entry) = jobs.get_mut(job_id) {
            Self::flush_entry(job_id, entry);
        }
    }

    /// Flush every dirty job log. Called on an interval by the engine.
    pub fn flush_all(&self) {
        let mut jobs = self.jobs.lock();
        for (job_id, entry) in jobs.iter_mut() {
            Self::flush_entry(job_id, entry);
        }
    }

    fn flush_entry(job_id: &JobId, entry: &mut JobLog) {
        if !entry.dirty {
            return;
        }
        if let Some(writer) = entry.writer.as_mut() {
            if let Err(e) = writer.flush() {
                tracing::warn!(job_id = %job_id, error = %e, "log flush failed");
            }
        }
        entry.dirty = false;
    }

    /// Close a job's log: flush, drop the file handle and subscribers,
    /// optionally delete the on-disk file (retention eviction).
    pub fn close(&self, job_id: &JobId, remove_file: bool) {
        let mut jobs = self.jobs.lock();
        if let Some(mut entry) = jobs.remove(job_id) {
            Self::flush_entry(job_id, &mut entry);
            // Dropping senders ends every subscriber's stream.
            entry.subscribers.clear();
        }
        if remove_file {
            let _ = std::fs::remove_file(self.log_path(job_id));
        }
    }

    /// Number of records appended for a job so far.
    pub fn record_count(&self, job_id: &JobId) -> u64 {
        self.jobs
            .lock()
            .get(job_id)
            .map(|entry| entry.next_seq)
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "logbus_tests.rs"]
mod tests;
