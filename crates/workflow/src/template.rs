// SPDX-License-Identifier: MIT

//! Workflow template definitions.

use indexmap::IndexMap;
use joblet_core::{parse_duration, parse_size, RequiredState, ResourceError};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Template versions this engine understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// A dependency edge: `"build"` or `"build:FAILED"`.
///
/// The bare form requires COMPLETED; an explicit `:COMPLETED` or `:FAILED`
/// suffix selects the required terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependsOn {
    pub step: String,
    pub required: RequiredState,
}

impl<'de> Deserialize<'de> for DependsOn {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        match raw.split_once(':') {
            None => Ok(DependsOn {
                step: raw,
                required: RequiredState::Completed,
            }),
            Some((step, state)) => {
                let required = match state {
                    "COMPLETED" => RequiredState::Completed,
                    "FAILED" => RequiredState::Failed,
                    other => {
                        return Err(de::Error::unknown_variant(
                            other,
                            &["COMPLETED", "FAILED"],
                        ))
                    }
                };
                Ok(DependsOn {
                    step: step.to_string(),
                    required,
                })
            }
        }
    }
}

/// Resource section of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StepResources {
    /// Aggregate CPU percent, 100 per core.
    #[serde(default)]
    pub max_cpu: u32,
    /// Size string, e.g. `"512MB"`.
    #[serde(default)]
    pub max_memory: Option<String>,
    #[serde(default)]
    pub max_iobps: u64,
    /// Core mask string, e.g. `"0-3,5"`.
    #[serde(default)]
    pub cpu_cores: Option<String>,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default)]
    pub gpu_memory_mb: u64,
}

impl StepResources {
    /// Parse into the core request type.
    pub fn to_request(&self) -> Result<joblet_core::ResourceRequest, ResourceError> {
        Ok(joblet_core::ResourceRequest {
            max_cpu_percent: self.max_cpu,
            cpu_cores: self
                .cpu_cores
                .as_deref()
                .map(joblet_core::CpuSet::parse)
                .transpose()?
                .filter(|set| !set.is_empty()),
            max_memory_bytes: self
                .max_memory
                .as_deref()
                .map(parse_size)
                .transpose()?
                .unwrap_or(0),
            max_io_bps: self.max_iobps,
            gpu_count: self.gpu_count,
            gpu_memory_mb: self.gpu_memory_mb,
        })
    }
}

/// Upload section of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepUploads {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub directories: Vec<String>,
}

/// One step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    /// Program and arguments: `[prog, arg...]`.
    pub command: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<DependsOn>,
    #[serde(default)]
    pub uploads: Option<StepUploads>,
    #[serde(default)]
    pub resources: StepResources,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub env_vars: IndexMap<String, String>,
    #[serde(default)]
    pub workdir: Option<String>,
    /// Additional attempts after a FAILED terminal, each a distinct job.
    #[serde(default)]
    pub retries: u32,
    /// Wall-time bound from RUNNING, e.g. `"90s"`.
    #[serde(default)]
    pub timeout: Option<String>,
}

impl StepSpec {
    /// Parsed timeout, if configured.
    pub fn timeout_duration(&self) -> Result<Option<Duration>, ResourceError> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }
}

/// A parsed workflow template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Steps by name; insertion order is the author's declaration order.
    pub jobs: IndexMap<String, StepSpec>,
}

impl WorkflowTemplate {
    /// All volume names any step references, deduplicated, declaration order.
    pub fn required_volumes(&self) -> Vec<String> {
        let mut seen = indexmap::IndexSet::new();
        for step in self.jobs.values() {
            for volume in &step.volumes {
                seen.insert(volume.clone());
            }
        }
        seen.into_iter().collect()
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
