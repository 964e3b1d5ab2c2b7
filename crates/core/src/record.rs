// SPDX-License-Identifier: MIT

//! Log records carried by the log bus.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobId;

/// Origin channel of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogChannel {
    /// Engine lifecycle records ("started", "exited rc=N", build failures).
    System,
    Info,
    Stdout,
    Stderr,
    /// Subscriber attach/detach and overflow markers.
    Connection,
    Error,
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogChannel::System => "system",
            LogChannel::Info => "info",
            LogChannel::Stdout => "stdout",
            LogChannel::Stderr => "stderr",
            LogChannel::Connection => "connection",
            LogChannel::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One record in a job's log stream.
///
/// `seq` is per-job monotonic starting at 0; subscribers observe strictly
/// increasing, contiguous sequences unless an overflow marker was inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub job_id: JobId,
    pub seq: u64,
    pub ts_ms: u64,
    pub channel: LogChannel,
    pub message: String,
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
