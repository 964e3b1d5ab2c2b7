// SPDX-License-Identifier: MIT

//! Adapter traits between the engine and the OS.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

use joblet_core::{
    DirUpload, JobId, Reservation, ResourceRequest, RuntimeManifest, Upload, VolumeKind,
};

/// Errors from sandbox construction and process supervision.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox build failed: {0}")]
    BuildFailed(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("sandbox corrupted: {0}")]
    SandboxCorrupted(String),
    #[error("build aborted")]
    Aborted,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the child joins a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkAttachment {
    /// Stay in the init network namespace.
    Host,
    /// setns(2) into the named namespace file before exec.
    Netns(PathBuf),
}

/// One volume to materialize into the sandbox.
#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub name: String,
    pub kind: VolumeKind,
    /// Backing directory for filesystem volumes.
    pub host_dir: Option<PathBuf>,
    /// tmpfs size for memory volumes.
    pub size_bytes: u64,
    /// Mount point inside the sandbox.
    pub target: String,
}

/// Everything the sandbox adapter needs to materialize one job's
/// environment. The engine derives env (manifest defaults, then job vars,
/// then secrets) before building; this crate never sees which entries are
/// secret.
pub struct BuildRequest {
    pub job_id: JobId,
    pub command: String,
    pub args: Vec<String>,
    /// Prepared runtime tree, `None` for the host runtime.
    pub runtime_dir: Option<PathBuf>,
    pub manifest: Option<RuntimeManifest>,
    pub reservation: Reservation,
    pub resources: ResourceRequest,
    pub volumes: Vec<VolumeMount>,
    pub uploads: Vec<Upload>,
    pub upload_dirs: Vec<DirUpload>,
    pub env: Vec<(String, String)>,
    pub workdir: String,
    pub network: NetworkAttachment,
    /// Checked between build steps; set by the scheduler to abort
    /// cooperatively. An aborted build unwinds and returns
    /// [`SandboxError::Aborted`].
    pub abort: Arc<AtomicBool>,
}

/// Artifacts that must be released after the job exits, in the order the
/// builder applied them (teardown walks them in reverse).
#[derive(Debug, Clone, Default)]
pub struct SandboxArtifacts {
    /// Mounted targets, oldest first.
    pub mounts: Vec<PathBuf>,
    /// Sandbox directory to remove.
    pub sandbox_dir: Option<PathBuf>,
    /// cgroup leaf to remove.
    pub cgroup_dir: Option<PathBuf>,
}

impl SandboxArtifacts {
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty() && self.sandbox_dir.is_none() && self.cgroup_dir.is_none()
    }
}

/// A fully-materialized execution environment; no process started yet.
pub struct LaunchSpec {
    pub job_id: JobId,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Working directory as seen by the child (inside the chroot when
    /// `rootfs` is set).
    pub cwd: String,
    /// Chroot target, when the job uses a runtime tree.
    pub rootfs: Option<PathBuf>,
    pub netns: Option<PathBuf>,
    pub cgroup_dir: Option<PathBuf>,
    pub artifacts: SandboxArtifacts,
}

/// Builds and releases sandboxes.
#[async_trait]
pub trait SandboxAdapter: Send + Sync + 'static {
    /// Materialize the environment for one job. On failure every applied
    /// step has already been unwound.
    async fn build(&self, request: BuildRequest) -> Result<LaunchSpec, SandboxError>;

    /// Release artifacts after exit (unmount in reverse, remove cgroup).
    /// Must be idempotent; called once by the supervisor.
    async fn teardown(&self, artifacts: &SandboxArtifacts);
}

/// How a supervised child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    /// Exit code as recorded on the job: 128+signum for signal deaths.
    pub fn exit_code(self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => code,
            ExitOutcome::Signaled(signum) => 128 + signum,
        }
    }

    pub fn success(self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

/// Control surface over one running child.
#[async_trait]
pub trait ProcessControl: Send {
    /// Wait for the child to exit and reap it.
    async fn wait(&mut self) -> Result<ExitOutcome, SandboxError>;

    /// Deliver a signal to the child's process group.
    fn signal(&self, signum: i32) -> Result<(), SandboxError>;
}

/// A launched child with its stdio pipes.
pub struct ProcessHandle {
    pub pid: i32,
    pub stdout: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pub control: Box<dyn ProcessControl>,
}

/// Spawns children from launch specs.
#[async_trait]
pub trait ProcessAdapter: Send + Sync + 'static {
    /// Spawn the child described by `spec`. Returns once the child has
    /// entered the sandbox (cgroup attached, exec barrier released) or
    /// with [`SandboxError::SpawnFailed`] without any state transition.
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, SandboxError>;
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
