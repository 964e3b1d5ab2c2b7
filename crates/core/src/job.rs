// SPDX-License-Identifier: MIT

//! Job identity, lifecycle state machine, and submission spec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::event::StopReason;
use crate::resource::ResourceRequest;
use crate::workflow::WorkflowId;

/// Unique identifier for a job.
///
/// Minted as a UUIDv4 at submission, but opaque everywhere else: the
/// engine only ever compares, hashes, and prints it. Workflow dependency
/// edges and log subscriptions reference jobs by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Mint a fresh id for a new submission.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for JobId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Lifecycle states of a job.
///
/// The only legal transitions are the edges checked by
/// [`JobStatus::can_transition`]; everything else is rejected by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admissible, possibly blocked on dependencies.
    Queued,
    /// Admitted; parked until its start time is reached.
    Scheduled,
    /// Sandbox is being built.
    Initializing,
    /// Child process is alive under a supervisor.
    Running,
    /// Exited with code 0.
    Completed,
    /// Exited non-zero, died on a signal, or the sandbox build failed.
    Failed,
    /// Cancelled before or during execution.
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Edge table for the lifecycle graph.
    pub fn can_transition(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, Scheduled)
                | (Queued, Stopped)
                | (Scheduled, Initializing)
                | (Scheduled, Stopped)
                | (Initializing, Running)
                | (Initializing, Failed)
                | (Initializing, Stopped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Stopped)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Initializing => "initializing",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Terminal state a dependency must reach before a dependent may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredState {
    /// Dependency must end COMPLETED (exit 0).
    #[default]
    Completed,
    /// Dependency must end FAILED.
    Failed,
}

impl RequiredState {
    /// True when a dependency's current state satisfies this requirement.
    pub fn satisfied_by(self, status: JobStatus) -> bool {
        match self {
            RequiredState::Completed => status == JobStatus::Completed,
            RequiredState::Failed => status == JobStatus::Failed,
        }
    }

    /// True when a terminal state makes this requirement impossible.
    /// STOPPED satisfies nothing and contradicts everything.
    pub fn contradicted_by(self, status: JobStatus) -> bool {
        status.is_terminal() && !self.satisfied_by(status)
    }
}

/// One dependency edge: wait for `job_id` to reach `required`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub job_id: JobId,
    #[serde(default)]
    pub required: RequiredState,
}

/// An uploaded file blob, materialized under `/work/uploads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// Path relative to the uploads directory.
    pub name: String,
    pub content: Vec<u8>,
    /// Unix mode bits; defaults to 0o644.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

/// An uploaded directory tree, materialized under `/work/uploaddirs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirUpload {
    pub name: String,
    pub files: Vec<Upload>,
}

/// Everything a submission carries. Secret env vars are split out by the
/// engine into the vault before the job record is stored; they never
/// appear on a [`Job`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Runtime name; `"host"` runs on the bare host tree.
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub resources: ResourceRequest,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub uploads: Vec<Upload>,
    #[serde(default)]
    pub upload_dirs: Vec<DirUpload>,
    #[serde(default)]
    pub workdir: Option<String>,
    /// Absolute start instant; in the past means "run now".
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub depends_on: Vec<DependencySpec>,
}

/// Default runtime when a spec names none.
pub const HOST_RUNTIME: &str = "host";

/// A job instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Monotonic submission sequence, for deterministic FIFO tie-breaks.
    pub seq: u64,
    pub command: String,
    pub args: Vec<String>,
    pub runtime: String,
    pub resources: ResourceRequest,
    /// Plain environment only; secrets live in the vault.
    pub env: HashMap<String, String>,
    pub volumes: Vec<String>,
    pub network: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<Upload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upload_dirs: Vec<DirUpload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub node_id: String,
}

impl Job {
    /// Create a job from a spec. Status starts QUEUED; a future schedule
    /// time is parked to SCHEDULED by the scheduler, not here.
    pub fn from_spec(
        id: JobId,
        seq: u64,
        spec: JobSpec,
        workflow_id: Option<WorkflowId>,
        node_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            seq,
            command: spec.command,
            args: spec.args,
            runtime: spec.runtime.unwrap_or_else(|| HOST_RUNTIME.to_string()),
            resources: spec.resources,
            env: spec.env,
            volumes: spec.volumes,
            network: spec.network.unwrap_or_else(|| "host".to_string()),
            uploads: spec.uploads,
            upload_dirs: spec.upload_dirs,
            workdir: spec.workdir,
            schedule_at: spec.schedule_at,
            depends_on: spec.depends_on,
            workflow_id,
            status: JobStatus::Queued,
            created_at,
            started_at: None,
            ended_at: None,
            exit_code: None,
            stop_reason: None,
            node_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when the job is QUEUED and blocked on a dependency that has
    /// not yet reached its required terminal state. `lookup` resolves a
    /// dependency's current status; an unknown dependency counts as
    /// unresolved. A QUEUED job whose dependencies are all satisfied is
    /// merely waiting for resources, not WAITING.
    pub fn is_waiting(&self, lookup: impl Fn(&JobId) -> Option<JobStatus>) -> bool {
        self.status == JobStatus::Queued
            && self.depends_on.iter().any(|dep| {
                !lookup(&dep.job_id)
                    .map(|status| dep.required.satisfied_by(status))
                    .unwrap_or(false)
            })
    }

    /// Exit code for a signal death, per POSIX shell convention.
    pub fn signal_exit_code(signum: i32) -> i32 {
        128 + signum
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
