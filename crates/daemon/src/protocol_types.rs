// SPDX-License-Identifier: MIT

//! Request/response DTOs: the wire shape of jobs and submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use joblet_core::{
    CpuSet, DependencySpec, DirUpload, Job, JobId, JobSpec, RequiredState, ResourceRequest, Upload,
};

/// A job submission as clients send it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Aggregate CPU percent, 100 per core.
    #[serde(default)]
    pub max_cpu: u32,
    /// Memory cap in bytes.
    #[serde(default)]
    pub max_memory: u64,
    #[serde(default)]
    pub max_iobps: u64,
    /// Core mask string like "0-3,5".
    #[serde(default)]
    pub cpu_cores: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub uploads: Vec<UploadDto>,
    #[serde(default)]
    pub upload_dirs: Vec<DirUploadDto>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    #[serde(default)]
    pub secret_env_vars: HashMap<String, String>,
    /// RFC3339 absolute start time.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<DependencyDto>,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default)]
    pub gpu_memory_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDto {
    pub name: String,
    pub content: Vec<u8>,
    #[serde(default)]
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirUploadDto {
    pub name: String,
    pub files: Vec<UploadDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDto {
    pub job_id: String,
    #[serde(default)]
    pub required: RequiredState,
}

impl ExecuteRequest {
    /// Parse into the engine's spec plus the secret env pairs (which go
    /// straight to the vault, never onto the job).
    pub fn into_spec(self) -> Result<(JobSpec, Vec<(String, String)>), String> {
        let cpu_cores = self
            .cpu_cores
            .as_deref()
            .map(CpuSet::parse)
            .transpose()
            .map_err(|e| e.to_string())?
            .filter(|set| !set.is_empty());

        let schedule_at = self
            .schedule
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| format!("invalid schedule: {e}"))
            })
            .transpose()?;

        let secrets: Vec<(String, String)> = self.secret_env_vars.into_iter().collect();

        let spec = JobSpec {
            command: self.command,
            args: self.args,
            runtime: self.runtime,
            resources: ResourceRequest {
                max_cpu_percent: self.max_cpu,
                cpu_cores,
                max_memory_bytes: self.max_memory,
                max_io_bps: self.max_iobps,
                gpu_count: self.gpu_count,
                gpu_memory_mb: self.gpu_memory_mb,
            },
            env: self.env_vars,
            volumes: self.volumes,
            network: self.network,
            uploads: self
                .uploads
                .into_iter()
                .map(|u| Upload {
                    name: u.name,
                    content: u.content,
                    mode: u.mode,
                })
                .collect(),
            upload_dirs: self
                .upload_dirs
                .into_iter()
                .map(|d| DirUpload {
                    name: d.name,
                    files: d
                        .files
                        .into_iter()
                        .map(|u| Upload {
                            name: u.name,
                            content: u.content,
                            mode: u.mode,
                        })
                        .collect(),
                })
                .collect(),
            workdir: None,
            schedule_at,
            depends_on: self
                .depends_on
                .into_iter()
                .map(|d| DependencySpec {
                    job_id: JobId::new(d.job_id),
                    required: d.required,
                })
                .collect(),
        };
        Ok((spec, secrets))
    }
}

/// Wire form of a job: everything observable, no upload payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: String,
    pub seq: u64,
    pub command: String,
    pub args: Vec<String>,
    pub runtime: String,
    pub network: String,
    pub volumes: Vec<String>,
    /// Status name; QUEUED with unresolved dependencies renders as
    /// `waiting`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_at: Option<DateTime<Utc>>,
    pub node_id: String,
}

impl JobDto {
    /// Render a job for the wire. `waiting` is the engine's judgement of
    /// whether this QUEUED job is blocked on an unresolved dependency
    /// (the DTO cannot know; it would need the other jobs' states).
    pub fn render(job: &Job, waiting: bool) -> Self {
        let status = if waiting {
            "waiting".to_string()
        } else {
            job.status.to_string()
        };
        Self {
            id: job.id.to_string(),
            seq: job.seq,
            command: job.command.clone(),
            args: job.args.clone(),
            runtime: job.runtime.clone(),
            network: job.network.clone(),
            volumes: job.volumes.clone(),
            status,
            workflow_id: job.workflow_id.as_ref().map(|id| id.to_string()),
            created_at: job.created_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
            exit_code: job.exit_code,
            stop_reason: job.stop_reason.map(|reason| reason.to_string()),
            schedule_at: job.schedule_at,
            node_id: job.node_id.clone(),
        }
    }
}

#[cfg(test)]
#[path = "protocol_types_tests.rs"]
mod tests;
