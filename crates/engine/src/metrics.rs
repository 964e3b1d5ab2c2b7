// SPDX-License-Identifier: MIT

//! System metrics fan-out for StreamMetrics subscribers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use joblet_sandbox::MetricsSample;

use crate::ledger::LedgerSnapshot;

/// One observation pushed to every metrics subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub host: MetricsSample,
    pub running_jobs: usize,
    pub total_jobs: usize,
    pub ledger: LedgerSnapshot,
}

const METRICS_CHANNEL_CAPACITY: usize = 16;

/// Subscriber registry; slow subscribers miss samples rather than block
/// the sampler.
#[derive(Default)]
pub struct MetricsHub {
    subscribers: Mutex<Vec<mpsc::Sender<EngineMetrics>>>,
}

impl MetricsHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<EngineMetrics> {
        let (tx, rx) = mpsc::channel(METRICS_CHANNEL_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Push a sample; disconnected subscribers are dropped, full ones
    /// skip this sample.
    pub fn publish(&self, metrics: EngineMetrics) {
        self.subscribers.lock().retain(|tx| {
            match tx.try_send(metrics.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
