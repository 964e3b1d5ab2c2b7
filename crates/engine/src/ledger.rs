// SPDX-License-Identifier: MIT

//! Resource ledger: atomic reserve/release over host totals.
//!
//! One mutex serializes mutations; `snapshot()` hands out a consistent
//! copy for observers. Core selection prefers the lowest-numbered free
//! cores; an explicit mask must be satisfiable exactly; GPU selection is
//! first-fit by index.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use joblet_core::{CpuSet, JobId, Reservation, ResourceRequest};
use joblet_sandbox::HostResources;

/// Why a reservation could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient memory: requested {requested}, free {free}")]
    Memory { requested: u64, free: u64 },
    #[error("insufficient cores: requested {requested}, free {free}")]
    Cores { requested: u32, free: u32 },
    #[error("requested cores unavailable: {mask}")]
    MaskUnavailable { mask: String },
    #[error("requested cores not on this host: {mask}")]
    MaskUnknown { mask: String },
    #[error("insufficient gpus: requested {requested}, free {free}")]
    Gpus { requested: u32, free: u32 },
}

/// Observable ledger state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total_memory_bytes: u64,
    pub free_memory_bytes: u64,
    pub total_cores: u32,
    pub free_cores: u32,
    pub total_gpus: u32,
    pub free_gpus: u32,
    pub reservations: Vec<Reservation>,
}

struct LedgerState {
    reserved_memory: u64,
    reserved_cores: CpuSet,
    reserved_gpus: BTreeSet<u32>,
    by_job: HashMap<JobId, Reservation>,
}

/// In-memory accounting of cores, memory, and GPUs.
pub struct ResourceLedger {
    host: HostResources,
    state: Mutex<LedgerState>,
}

impl ResourceLedger {
    pub fn new(host: HostResources) -> Self {
        Self {
            host,
            state: Mutex::new(LedgerState {
                reserved_memory: 0,
                reserved_cores: CpuSet::new(),
                reserved_gpus: BTreeSet::new(),
                by_job: HashMap::new(),
            }),
        }
    }

    pub fn host(&self) -> &HostResources {
        &self.host
    }

    /// Atomically reserve every dimension of `request`, or fail without
    /// reserving anything.
    pub fn reserve(
        &self,
        job_id: &JobId,
        request: &ResourceRequest,
    ) -> Result<Reservation, LedgerError> {
        let mut state = self.state.lock();

        // Memory.
        let free_memory = self.host.total_memory_bytes - state.reserved_memory;
        if request.max_memory_bytes > free_memory {
            return Err(LedgerError::Memory {
                requested: request.max_memory_bytes,
                free: free_memory,
            });
        }

        // Cores: explicit mask must match exactly, otherwise take the
        // lowest-numbered free cores of the requested count.
        let cores = match &request.cpu_cores {
            Some(mask) => {
                let host_cores = CpuSet::from_cores(self.host.cores.iter().copied());
                if !mask.is_subset(&host_cores) {
                    return Err(LedgerError::MaskUnknown {
                        mask: mask.to_string(),
                    });
                }
                if !mask.is_disjoint(&state.reserved_cores) {
                    return Err(LedgerError::MaskUnavailable {
                        mask: mask.to_string(),
                    });
                }
                mask.clone()
            }
            None => {
                let needed = request.cores_needed();
                let free: Vec<u32> = self
                    .host
                    .cores
                    .iter()
                    .copied()
                    .filter(|core| !state.reserved_cores.contains(*core))
                    .collect();
                if (free.len() as u32) < needed {
                    return Err(LedgerError::Cores {
                        requested: needed,
                        free: free.len() as u32,
                    });
                }
                CpuSet::from_cores(free.into_iter().take(needed as usize))
            }
        };

        // GPUs: first-fit by index.
        let free_gpus: Vec<u32> = self
            .host
            .gpus
            .iter()
            .copied()
            .filter(|gpu| !state.reserved_gpus.contains(gpu))
            .collect();
        if (free_gpus.len() as u32) < request.gpu_count {
            return Err(LedgerError::Gpus {
                requested: request.gpu_count,
                free: free_gpus.len() as u32,
            });
        }
        let gpu_indices: BTreeSet<u32> = free_gpus
            .into_iter()
            .take(request.gpu_count as usize)
            .collect();

        // Commit.
        state.reserved_memory += request.max_memory_bytes;
        for core in cores.iter() {
            state.reserved_cores.insert(core);
        }
        state.reserved_gpus.extend(gpu_indices.iter().copied());

        let reservation = Reservation {
            job_id: job_id.clone(),
            cores,
            memory_bytes: request.max_memory_bytes,
            gpu_indices,
        };
        state.by_job.insert(job_id.clone(), reservation.clone());
        tracing::debug!(job_id = %job_id, cores = %reservation.cores, "reserved");
        Ok(reservation)
    }

    /// Release a job's reservation. Idempotent.
    pub fn release(&self, job_id: &JobId) {
        let mut state = self.state.lock();
        let Some(reservation) = state.by_job.remove(job_id) else {
            return;
        };
        state.reserved_memory -= reservation.memory_bytes;
        let remaining: Vec<u32> = state
            .reserved_cores
            .iter()
            .filter(|core| !reservation.cores.contains(*core))
            .collect();
        state.reserved_cores = CpuSet::from_cores(remaining);
        for gpu in &reservation.gpu_indices {
            state.reserved_gpus.remove(gpu);
        }
        tracing::debug!(job_id = %job_id, "released");
    }

    /// Consistent copy of totals, free counts, and live reservations.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        let mut reservations: Vec<Reservation> = state.by_job.values().cloned().collect();
        reservations.sort_by(|a, b| a.job_id.as_str().cmp(b.job_id.as_str()));
        LedgerSnapshot {
            total_memory_bytes: self.host.total_memory_bytes,
            free_memory_bytes: self.host.total_memory_bytes - state.reserved_memory,
            total_cores: self.host.cores.len() as u32,
            free_cores: (self.host.cores.len() - state.reserved_cores.len()) as u32,
            total_gpus: self.host.gpus.len() as u32,
            free_gpus: (self.host.gpus.len() - state.reserved_gpus.len()) as u32,
            reservations,
        }
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
