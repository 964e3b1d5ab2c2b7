// SPDX-License-Identifier: MIT

//! Job store: sharded registry and the lifecycle transition authority.
//!
//! Transitions are serialized per job by the shard lock and validated
//! against the lifecycle edge table with an optimistic check on the
//! expected `from` state. Observers are notified on the transition
//! broadcast strictly after commit.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tokio::sync::broadcast;

use chrono::{DateTime, Utc};
use joblet_core::{Job, JobId, JobStatus, StopReason, TransitionEvent};

const SHARD_COUNT: usize = 16;

/// Fields a transition may set, alongside the state change.
#[derive(Debug, Clone, Default)]
pub struct TransitionAttrs {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub stop_reason: Option<StopReason>,
}

/// Transition failures.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("invalid transition for {id}: expected {expected}, was {actual}, to {to}")]
    Conflict {
        id: JobId,
        expected: JobStatus,
        actual: JobStatus,
        to: JobStatus,
    },
    #[error("forbidden transition for {id}: {from} -> {to}")]
    Forbidden {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Sharded in-memory job registry.
pub struct JobStore {
    shards: Vec<Mutex<HashMap<JobId, Job>>>,
    transitions: broadcast::Sender<TransitionEvent>,
}

impl JobStore {
    pub fn new() -> Self {
        let (transitions, _) = broadcast::channel(1024);
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            transitions,
        }
    }

    fn shard(&self, id: &JobId) -> &Mutex<HashMap<JobId, Job>> {
        let mut hasher = DefaultHasher::new();
        id.as_str().hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Subscribe to committed transitions.
    pub fn watch_transitions(&self) -> broadcast::Receiver<TransitionEvent> {
        self.transitions.subscribe()
    }

    pub fn insert(&self, job: Job) {
        self.shard(&job.id).lock().insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.shard(id).lock().get(id).cloned()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.shard(id).lock().contains_key(id)
    }

    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.shard(id).lock().remove(id)
    }

    /// All jobs, in submission order.
    pub fn all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .shards
            .iter()
            .flat_map(|shard| shard.lock().values().cloned().collect::<Vec<_>>())
            .collect();
        jobs.sort_by_key(|job| job.seq);
        jobs
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commit a state transition with an optimistic check on `from`.
    ///
    /// Returns the updated job. The transition event is broadcast after
    /// the shard lock is released.
    pub fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        attrs: TransitionAttrs,
    ) -> Result<Job, TransitionError> {
        let (job, event) = {
            let mut shard = self.shard(id).lock();
            let job = shard
                .get_mut(id)
                .ok_or_else(|| TransitionError::NotFound(id.clone()))?;
            if job.status != from {
                return Err(TransitionError::Conflict {
                    id: id.clone(),
                    expected: from,
                    actual: job.status,
                    to,
                });
            }
            if !from.can_transition(to) {
                return Err(TransitionError::Forbidden {
                    id: id.clone(),
                    from,
                    to,
                });
            }

            job.status = to;
            if attrs.started_at.is_some() {
                job.started_at = attrs.started_at;
            }
            if attrs.ended_at.is_some() {
                job.ended_at = attrs.ended_at;
            }
            if attrs.exit_code.is_some() {
                job.exit_code = attrs.exit_code;
            }
            if attrs.stop_reason.is_some() {
                job.stop_reason = attrs.stop_reason;
            }

            let event = TransitionEvent {
                job_id: id.clone(),
                from,
                to,
                at_ms: Utc::now().timestamp_millis().max(0) as u64,
                exit_code: job.exit_code,
                workflow_id: job.workflow_id.clone(),
            };
            (job.clone(), event)
        };

        tracing::info!(job_id = %id, %from, %to, "transition");
        let _ = self.transitions.send(event);
        Ok(job)
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
