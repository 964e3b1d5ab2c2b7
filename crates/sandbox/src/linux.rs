// SPDX-License-Identifier: MIT

//! The real sandbox builder: cgroup slice + mount materialization.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use crate::adapter::{
    BuildRequest, LaunchSpec, NetworkAttachment, SandboxAdapter, SandboxArtifacts, SandboxError,
};
use crate::{cgroup, mounts};

/// Builds sandboxes on the live host. Requires privileges for mount and
/// cgroup writes; the daemon refuses to hand it real work otherwise.
pub struct LinuxSandbox {
    /// Directory for per-job sandbox trees (`<state-dir>/sandboxes`).
    sandboxes_dir: PathBuf,
    /// cgroup v2 mount point.
    cgroup_root: PathBuf,
    /// Block device for `io.max`, discovered from the state dir.
    io_device: Option<(u64, u64)>,
}

impl LinuxSandbox {
    pub fn new(sandboxes_dir: PathBuf, io_device: Option<(u64, u64)>) -> Self {
        Self {
            sandboxes_dir,
            cgroup_root: PathBuf::from(cgroup::CGROUP_ROOT),
            io_device,
        }
    }

    fn check_abort(request: &BuildRequest) -> Result<(), SandboxError> {
        if request.abort.load(Ordering::SeqCst) {
            Err(SandboxError::Aborted)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SandboxAdapter for LinuxSandbox {
    async fn build(&self, request: BuildRequest) -> Result<LaunchSpec, SandboxError> {
        let mut artifacts = SandboxArtifacts::default();
        match self.build_inner(&request, &mut artifacts).await {
            Ok(spec) => Ok(spec),
            Err(e) => {
                tracing::warn!(job_id = %request.job_id, error = %e, "build failed, unwinding");
                self.teardown(&artifacts).await;
                Err(e)
            }
        }
    }

    async fn teardown(&self, artifacts: &SandboxArtifacts) {
        let artifacts = artifacts.clone();
        let result = tokio::task::spawn_blocking(move || {
            for target in artifacts.mounts.iter().rev() {
                mounts::unmount(target);
            }
            if let Some(dir) = &artifacts.sandbox_dir {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    tracing::debug!(dir = %dir.display(), error = %e, "sandbox dir removal failed");
                }
            }
            if let Some(cgroup_dir) = &artifacts.cgroup_dir {
                let slice = cgroup::CgroupSlice::from_dir(cgroup_dir.clone());
                let _ = slice.kill_all();
                // Processes need a moment to die before rmdir succeeds.
                for _ in 0..10 {
                    match slice.remove() {
                        Ok(()) => return,
                        Err(_) => std::thread::sleep(std::time::Duration::from_millis(50)),
                    }
                }
                if let Err(e) = slice.remove() {
                    tracing::warn!(dir = %cgroup_dir.display(), error = %e, "cgroup removal failed");
                }
            }
        })
        .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "teardown task panicked");
        }
    }
}

impl LinuxSandbox {
    async fn build_inner(
        &self,
        request: &BuildRequest,
        artifacts: &mut SandboxArtifacts,
    ) -> Result<LaunchSpec, SandboxError> {
        Self::check_abort(request)?;

        // 1. cgroup leaf with rendered limits.
        let limits = cgroup::render_limits(&request.resources, &request.reservation, self.io_device);
        let cgroup_root = self.cgroup_root.clone();
        let job_id = request.job_id.to_string();
        let slice = tokio::task::spawn_blocking(move || {
            cgroup::CgroupSlice::create(&cgroup_root, &job_id, &limits)
        })
        .await
        .map_err(|e| SandboxError::BuildFailed(format!("cgroup task: {e}")))?
        .map_err(|e| SandboxError::BuildFailed(format!("cgroup setup: {e}")))?;
        artifacts.cgroup_dir = Some(slice.dir().to_path_buf());

        Self::check_abort(request)?;

        // 2. Filesystem view.
        let sandbox_dir = self.sandboxes_dir.join(request.job_id.as_str());
        std::fs::create_dir_all(&sandbox_dir)
            .map_err(|e| SandboxError::BuildFailed(format!("sandbox dir: {e}")))?;
        artifacts.sandbox_dir = Some(sandbox_dir.clone());

        let (rootfs, cwd) = match (&request.runtime_dir, &request.manifest) {
            (Some(runtime_dir), Some(manifest)) => {
                let rootfs = sandbox_dir.join("rootfs");
                let plan =
                    mounts::plan_mounts(&rootfs, runtime_dir, &manifest.mounts, &request.volumes)
                        .map_err(SandboxError::BuildFailed)?;
                for planned in &plan {
                    Self::check_abort(request)?;
                    let planned_clone = planned.clone();
                    tokio::task::spawn_blocking(move || mounts::apply(&planned_clone))
                        .await
                        .map_err(|e| SandboxError::BuildFailed(format!("mount task: {e}")))?
                        .map_err(SandboxError::BuildFailed)?;
                    artifacts.mounts.push(planned.target().to_path_buf());
                }
                mounts::write_uploads(&rootfs, &request.uploads, &request.upload_dirs)
                    .map_err(|e| SandboxError::BuildFailed(format!("uploads: {e}")))?;
                let cwd = request
                    .workdir
                    .clone();
                (Some(rootfs), cwd)
            }
            _ => {
                // Host runtime: no rootfs, work tree on the state dir.
                let work = sandbox_dir.join("work");
                std::fs::create_dir_all(&work)
                    .map_err(|e| SandboxError::BuildFailed(format!("work dir: {e}")))?;
                mounts::write_uploads(&work, &request.uploads, &request.upload_dirs)
                    .map_err(|e| SandboxError::BuildFailed(format!("uploads: {e}")))?;
                (None, work.display().to_string())
            }
        };

        Self::check_abort(request)?;

        // 3. Network attachment was resolved by the engine (namespace file
        // already pinned); just thread the path through.
        let netns = match &request.network {
            NetworkAttachment::Host => None,
            NetworkAttachment::Netns(path) => Some(path.clone()),
        };

        Ok(LaunchSpec {
            job_id: request.job_id.clone(),
            command: request.command.clone(),
            args: request.args.clone(),
            env: request.env.clone(),
            cwd,
            rootfs,
            netns,
            cgroup_dir: artifacts.cgroup_dir.clone(),
            artifacts: artifacts.clone(),
        })
    }
}

#[cfg(test)]
#[path = "linux_tests.rs"]
mod tests;
