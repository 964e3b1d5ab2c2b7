// SPDX-License-Identifier: MIT

//! Host resource discovery and metrics sampling.

use serde::{Deserialize, Serialize};
use std::path::Path;
use sysinfo::System;

/// Totals discovered from the host at startup; the ledger's capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResources {
    pub total_memory_bytes: u64,
    /// Core indices available for pinning (0..n).
    pub cores: Vec<u32>,
    /// GPU indices present (`/dev/nvidia<N>`).
    pub gpus: Vec<u32>,
}

impl HostResources {
    /// Discover totals from the running host.
    pub fn discover() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_all();
        let core_count = system.cpus().len().max(1) as u32;
        Self {
            total_memory_bytes: system.total_memory(),
            cores: (0..core_count).collect(),
            gpus: discover_gpus(Path::new("/dev")),
        }
    }

    /// Fixed totals, for tests and constrained deployments.
    pub fn fixed(total_memory_bytes: u64, core_count: u32, gpu_count: u32) -> Self {
        Self {
            total_memory_bytes,
            cores: (0..core_count).collect(),
            gpus: (0..gpu_count).collect(),
        }
    }
}

/// Scan for `nvidia<N>` device nodes.
fn discover_gpus(dev: &Path) -> Vec<u32> {
    let mut gpus: Vec<u32> = std::fs::read_dir(dev)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            name.strip_prefix("nvidia")
                .and_then(|rest| rest.parse::<u32>().ok())
        })
        .collect();
    gpus.sort_unstable();
    gpus
}

/// `(major, minor)` of the block device backing `path`, for `io.max`.
#[cfg(target_os = "linux")]
pub fn backing_device(path: &Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    let dev = std::fs::metadata(path).ok()?.dev();
    let major = libc::major(dev);
    let minor = libc::minor(dev);
    if major == 0 {
        // tmpfs/overlay; nothing meaningful to throttle.
        return None;
    }
    Some((major as u64, minor as u64))
}

#[cfg(not(target_os = "linux"))]
pub fn backing_device(_path: &Path) -> Option<(u64, u64)> {
    None
}

/// One metrics observation, fanned out to StreamMetrics subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSample {
    pub ts_ms: u64,
    pub cpu_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

/// Stateful sampler; CPU usage needs two refreshes to be meaningful, so
/// callers hold one sampler and poll it on an interval.
pub struct MetricsSampler {
    system: System,
}

impl MetricsSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        Self { system }
    }

    pub fn sample(&mut self, ts_ms: u64) -> MetricsSample {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        MetricsSample {
            ts_ms,
            cpu_percent: self.system.global_cpu_usage(),
            memory_used_bytes: self.system.used_memory(),
            memory_total_bytes: self.system.total_memory(),
        }
    }
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
