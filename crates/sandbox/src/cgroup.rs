// SPDX-License-Identifier: MIT

//! cgroup v2 slice management.
//!
//! The engine owns a root slice (default `/sys/fs/cgroup/joblet.slice`)
//! and creates one leaf per job. Limit values are rendered by pure
//! functions so the math is testable without a cgroup filesystem.

use std::io;
use std::path::{Path, PathBuf};

use joblet_core::{Reservation, ResourceRequest};

/// Default cgroup v2 mount point.
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";
/// Engine-owned slice under the root.
pub const ENGINE_SLICE: &str = "joblet.slice";

/// CPU quota period in microseconds (cgroup v2 default).
const CPU_PERIOD_US: u64 = 100_000;

/// Render the limit files to write for a job, as `(file, value)` pairs.
///
/// `io_device` is the `(major, minor)` of the block device IO limits apply
/// to; without it `io.max` is skipped.
pub fn render_limits(
    resources: &ResourceRequest,
    reservation: &Reservation,
    io_device: Option<(u64, u64)>,
) -> Vec<(String, String)> {
    let mut files = Vec::new();

    files.push(("cpu.weight".to_string(), "100".to_string()));

    if resources.max_cpu_percent > 0 {
        let quota = resources.max_cpu_percent as u64 * (CPU_PERIOD_US / 100);
        files.push(("cpu.max".to_string(), format!("{quota} {CPU_PERIOD_US}")));
    }

    if !reservation.cores.is_empty() {
        files.push(("cpuset.cpus".to_string(), reservation.cores.to_string()));
    }

    if resources.max_memory_bytes > 0 {
        files.push((
            "memory.max".to_string(),
            resources.max_memory_bytes.to_string(),
        ));
    }

    if resources.max_io_bps > 0 {
        if let Some((major, minor)) = io_device {
            let bps = resources.max_io_bps;
            files.push((
                "io.max".to_string(),
                format!("{major}:{minor} rbps={bps} wbps={bps}"),
            ));
        }
    }

    files
}

/// Name of a job's cgroup leaf.
pub fn leaf_name(job_id: &str) -> String {
    format!("job-{job_id}")
}

/// One job's cgroup leaf.
#[derive(Debug, Clone)]
pub struct CgroupSlice {
    dir: PathBuf,
}

impl CgroupSlice {
    /// Create the leaf directory under `<root>/<ENGINE_SLICE>` and write
    /// the rendered limits into it.
    pub fn create(
        root: &Path,
        job_id: &str,
        limits: &[(String, String)],
    ) -> io::Result<Self> {
        let dir = root.join(ENGINE_SLICE).join(leaf_name(job_id));
        std::fs::create_dir_all(&dir)?;
        let slice = Self { dir };
        for (file, value) in limits {
            slice.write_file(file, value)?;
        }
        Ok(slice)
    }

    /// Re-wrap an existing leaf directory (for teardown).
    pub fn from_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move a process into this cgroup.
    pub fn add_process(&self, pid: u32) -> io::Result<()> {
        self.write_file("cgroup.procs", &pid.to_string())
    }

    /// Kill every process in the leaf (`cgroup.kill`, kernel 5.14+).
    pub fn kill_all(&self) -> io::Result<()> {
        self.write_file("cgroup.kill", "1")
    }

    /// Remove the leaf. Fails while processes remain; callers kill first.
    pub fn remove(&self) -> io::Result<()> {
        std::fs::remove_dir(&self.dir)
    }

    fn write_file(&self, file: &str, value: &str) -> io::Result<()> {
        let path = self.dir.join(file);
        tracing::trace!(path = %path.display(), value, "cgroup write");
        std::fs::write(path, value)
    }
}

#[cfg(test)]
#[path = "cgroup_tests.rs"]
mod tests;
