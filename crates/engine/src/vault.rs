// SPDX-License-Identifier: MIT

//! Secret environment vault.
//!
//! Secret env vars never touch the job record, the persisted JSON, or the
//! log bus. They live here, keyed by job, and are erased at terminal
//! transition (or retention eviction, whichever comes first).

use parking_lot::Mutex;
use std::collections::HashMap;

use joblet_core::JobId;

/// In-memory secret store. `Debug` is deliberately value-free.
#[derive(Default)]
pub struct SecretVault {
    secrets: Mutex<HashMap<JobId, Vec<(String, String)>>>,
}

impl SecretVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, job_id: &JobId, secrets: Vec<(String, String)>) {
        if secrets.is_empty() {
            return;
        }
        self.secrets.lock().insert(job_id.clone(), secrets);
    }

    /// Secrets for a job, in insertion order. Empty when none were given
    /// or they were already erased.
    pub fn get(&self, job_id: &JobId) -> Vec<(String, String)> {
        self.secrets.lock().get(job_id).cloned().unwrap_or_default()
    }

    /// Erase a job's secrets. Idempotent.
    pub fn erase(&self, job_id: &JobId) {
        self.secrets.lock().remove(job_id);
    }
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.secrets.lock().len();
        write!(f, "SecretVault({count} jobs)")
    }
}

#[cfg(test)]
#[path = "vault_tests.rs"]
mod tests;
