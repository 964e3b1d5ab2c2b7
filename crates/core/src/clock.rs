// SPDX-License-Identifier: MIT

//! Clock abstraction for testable time.

use chrono::{DateTime, TimeZone, Utc};
use std::time::{Duration, Instant};

/// Source of time for the engine.
///
/// `now()` yields a monotonic instant for timers and deadlines; `epoch_ms()`
/// yields wall-clock milliseconds for timestamps on records. Both come from
/// the same clock so tests can advance them together.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant, for deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock time as milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Wall-clock time as a UTC datetime.
    fn utc_now(&self) -> DateTime<Utc> {
        epoch_ms_to_utc(self.epoch_ms())
    }
}

/// Convert epoch milliseconds to a UTC datetime (clamped on overflow).
pub fn epoch_ms_to_utc(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .unwrap_or_default()
}

/// System clock for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually-advanced clock for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct FakeClock {
    base: Instant,
    offset: std::sync::Arc<parking_lot::Mutex<Duration>>,
    epoch_base_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: std::sync::Arc::new(parking_lot::Mutex::new(Duration::ZERO)),
            epoch_base_ms: 1_700_000_000_000,
        }
    }

    /// Advance both the monotonic and wall clocks.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset += by;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn epoch_ms(&self) -> u64 {
        self.epoch_base_ms + self.offset.lock().as_millis() as u64
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
