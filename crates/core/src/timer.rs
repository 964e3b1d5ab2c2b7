// SPDX-License-Identifier: MIT

//! Scheduler timer identifiers.

use crate::job::JobId;
use crate::workflow::WorkflowId;

/// Identifier for a scheduler timer.
///
/// The timer's purpose rides in a `kind/...` prefix, so a fired timer
/// routes without a side table. Never serialized; timers die with the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerId(String);

impl TimerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fires when a parked job's schedule time arrives.
    pub fn schedule(job: &JobId) -> Self {
        Self(format!("schedule/{job}"))
    }

    /// Fires when a running job exceeds its workflow step timeout.
    pub fn timeout(job: &JobId) -> Self {
        Self(format!("timeout/{job}"))
    }

    /// Fires when the SIGTERM grace window elapses.
    pub fn grace(job: &JobId) -> Self {
        Self(format!("grace/{job}"))
    }

    /// Fires when a failed workflow step may be retried.
    pub fn retry(workflow: &WorkflowId, step: &str) -> Self {
        Self(format!("retry/{workflow}/{step}"))
    }

    /// Split into `(kind, rest)`.
    pub fn kind(&self) -> (&str, &str) {
        self.0.split_once('/').unwrap_or((self.0.as_str(), ""))
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
