// SPDX-License-Identifier: MIT

//! RPC protocol for daemon communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

use serde::{Deserialize, Serialize};

use joblet_core::{LogRecord, Network, RuntimeManifest, Volume, VolumeKind, Workflow};
use joblet_engine::{EngineError, EngineMetrics};

use crate::auth::Principal;
use crate::protocol_types::{ExecuteRequest, JobDto};

/// Every connection carries exactly one envelope: the authenticated
/// principal plus the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub principal: Principal,
    pub request: Request,
}

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Submit a job for execution
    SubmitJob { spec: Box<ExecuteRequest> },

    /// Fetch one job
    GetJob { id: String },

    /// Page through jobs, optionally filtered by status
    ListJobs {
        #[serde(default)]
        page: usize,
        #[serde(default = "default_page_size")]
        size: usize,
        #[serde(default)]
        filter: Option<String>,
    },

    /// Stop a job (SIGTERM, then SIGKILL after the grace window)
    StopJob { id: String },

    /// Delete a terminal job and its records
    DeleteJob { id: String },

    /// Delete all non-running jobs
    DeleteAllJobs,

    /// Stream a job's log records; the connection stays open
    StreamLogs {
        id: String,
        /// First sequence to deliver; -1 tails live records only.
        #[serde(default)]
        from_sequence: i64,
    },

    /// Stream periodic system metrics; the connection stays open
    StreamMetrics,

    /// List installed runtimes
    ListRuntimes,

    /// Install a runtime from a source tree (runs as a build job)
    InstallRuntime { name: String, source: String },

    /// Remove an installed runtime
    RemoveRuntime { name: String },

    /// Create a named volume
    CreateVolume {
        name: String,
        size: String,
        kind: VolumeKind,
    },

    /// Delete a volume (refused while jobs reference it)
    DeleteVolume { name: String },

    /// List volumes
    ListVolumes,

    /// Create a named network
    CreateNetwork { name: String, cidr: String },

    /// Delete a network (built-ins are refused)
    DeleteNetwork { name: String },

    /// List networks
    ListNetworks,

    /// Submit a workflow from YAML
    SubmitWorkflow {
        yaml: String,
        #[serde(default)]
        create_missing_volumes: bool,
    },

    /// Fetch a workflow with its children
    GetWorkflow { id: String },

    /// List workflows
    ListWorkflows,

    /// Cancel a workflow: stop running children, stop pending ones
    StopWorkflow { id: String },

    /// Request daemon shutdown
    Shutdown,
}

fn default_page_size() -> usize {
    50
}

/// Stable error codes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    DuplicateName,
    AlreadyTerminal,
    StillRunning,
    InUse,
    Insufficient,
    UnknownRuntime,
    ParseError,
    CycleDetected,
    MissingVolumes,
    Overflow,
    Internal,
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check reply
    Pong { version: String },

    /// Typed failure
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        details: Vec<String>,
    },

    /// Job accepted
    Submitted { job_id: String, status: String },

    /// One job
    Job { job: JobDto },

    /// Jobs page
    Jobs { jobs: Vec<JobDto>, total: usize },

    /// DeleteAllJobs outcome
    Deleted { deleted: usize, skipped: usize },

    /// Install meta-job started
    InstallStarted { build_job_id: String },

    /// Installed runtimes
    Runtimes { runtimes: Vec<RuntimeManifest> },

    /// Volumes
    Volumes { volumes: Vec<Volume> },

    /// Networks
    Networks { networks: Vec<Network> },

    /// Workflow accepted
    WorkflowSubmitted {
        workflow_id: String,
        job_ids: Vec<String>,
    },

    /// One workflow with children
    Workflow {
        workflow: Workflow,
        jobs: Vec<JobDto>,
    },

    /// Workflows
    Workflows { workflows: Vec<Workflow> },

    /// One log record (streaming)
    Log { record: LogRecord },

    /// One metrics sample (streaming)
    Metrics { metrics: EngineMetrics },

    /// The subscriber fell behind and was disconnected
    Overflow,

    /// End of a stream
    StreamEnd,
}

impl Response {
    /// Map an engine error to its wire form.
    pub fn from_engine_error(error: &EngineError) -> Self {
        let (code, details) = match error {
            EngineError::InvalidRequest(_) => (ErrorCode::InvalidRequest, Vec::new()),
            EngineError::UnknownRuntime(_) => (ErrorCode::UnknownRuntime, Vec::new()),
            EngineError::NotFound(_) => (ErrorCode::NotFound, Vec::new()),
            EngineError::DuplicateName(_) => (ErrorCode::DuplicateName, Vec::new()),
            EngineError::AlreadyTerminal(_) => (ErrorCode::AlreadyTerminal, Vec::new()),
            EngineError::StillRunning(_) => (ErrorCode::StillRunning, Vec::new()),
            EngineError::InUse(_) => (ErrorCode::InUse, Vec::new()),
            EngineError::Insufficient(_) => (ErrorCode::Insufficient, Vec::new()),
            EngineError::ParseError(_) => (ErrorCode::ParseError, Vec::new()),
            EngineError::CycleDetected(steps) => (ErrorCode::CycleDetected, steps.clone()),
            EngineError::MissingVolumes(names) => (ErrorCode::MissingVolumes, names.clone()),
            EngineError::Internal(_) => (ErrorCode::Internal, Vec::new()),
        };
        Response::Error {
            code,
            message: error.to_string(),
            details,
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
