// SPDX-License-Identifier: MIT

//! Timer table for the scheduler loop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use joblet_core::TimerId;

/// Timer entry
#[derive(Debug, Clone)]
struct Timer {
    fires_at: Instant,
}

/// Deadline timers keyed by [`TimerId`].
#[derive(Debug, Default)]
pub struct TimerTable {
    timers: HashMap<TimerId, Timer>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or reset) a timer.
    pub fn set(&mut self, id: TimerId, duration: Duration, now: Instant) {
        self.timers.insert(id, Timer { fires_at: now + duration });
    }

    /// Cancel a timer.
    pub fn cancel(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    /// Cancel all timers whose id starts with a prefix (e.g. every timer
    /// of one job).
    pub fn cancel_with_suffix(&mut self, suffix: &str) {
        self.timers.retain(|id, _| !id.as_str().ends_with(suffix));
    }

    /// Drain and return all timers that have fired.
    pub fn fired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut fired: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.fires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        fired.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for id in &fired {
            self.timers.remove(id);
        }
        fired
    }

    /// Earliest deadline, if any timer is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|timer| timer.fires_at).min()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
