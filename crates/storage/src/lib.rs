// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joblet-storage: the on-disk shape of engine state.
//!
//! Layout under `<state-dir>`:
//!
//! ```text
//! jobs/<job-id>.json       one record per job, written at terminal transition
//! logs/<job-id>.log        append-only log records (owned by the log bus)
//! runtimes/<name>/...      prepared runtime trees
//! volumes/<name>/...       filesystem volume backing dirs
//! workflows/<id>.json      one record per workflow
//! sandboxes/<job-id>/...   ephemeral sandbox trees
//! ```
//!
//! Recovery is best-effort and observable-state only: at startup the
//! engine reloads job and workflow records so queries answer across
//! restarts, but no queued work survives.

pub mod layout;
pub mod store;

pub use layout::StateLayout;
pub use store::{StateStore, StorageError};
