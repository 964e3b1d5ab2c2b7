// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joblet-engine: the execution core.
//!
//! Submissions enter through [`Engine`], the scheduler loop
//! ([`Scheduler`]) admits them against the [`ResourceLedger`] under the
//! worker cap, per-job supervisor tasks drive sandbox build → launch →
//! exit, and the [`LogBus`] fans captured output to subscribers. Workflow
//! DAGs resolve through the same machinery, one child job per step.

mod builder;
mod engine;
#[cfg(test)]
mod test_helpers;
mod error;
mod install;
mod jobs;
mod ledger;
mod logbus;
mod metrics;
mod registry;
mod resolver;
mod scheduler;
mod supervisor;
mod timers;
mod vault;

pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use jobs::{JobStore, TransitionAttrs, TransitionError};
pub use ledger::{LedgerError, LedgerSnapshot, ResourceLedger};
pub use logbus::{LogBus, LogSubscription, DEFAULT_RING_CAPACITY};
pub use metrics::{EngineMetrics, MetricsHub};
pub use registry::RuntimeRegistry;
pub use scheduler::Scheduler;
pub use timers::TimerTable;
pub use vault::SecretVault;
