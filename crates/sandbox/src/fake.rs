// SPDX-License-Identifier: MIT

//! In-memory fakes for the sandbox and process seams.
//!
//! `FakeProcessAdapter` interprets a tiny command vocabulary (`echo`,
//! `sleep`, `true`, `false`, `fail`) so scheduler and supervisor tests can
//! run real end-to-end traces without privileges. Fake time is scaled:
//! one `sleep` second costs [`FakeProcessAdapter::time_scale`] of wall
//! time.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use joblet_core::JobId;

use crate::adapter::{
    BuildRequest, ExitOutcome, LaunchSpec, ProcessAdapter, ProcessControl, ProcessHandle,
    SandboxAdapter, SandboxArtifacts, SandboxError,
};

/// Records build/teardown calls and fabricates empty launch specs.
#[derive(Default)]
pub struct FakeSandbox {
    built: Mutex<Vec<JobId>>,
    torn_down: Mutex<Vec<JobId>>,
    fail_runtimes: Mutex<HashSet<String>>,
    /// Extra latency per build, to widen cancellation windows in tests.
    build_delay: Mutex<Duration>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make builds fail for jobs using the given runtime.
    pub fn fail_builds_for_runtime(&self, runtime: &str) {
        self.fail_runtimes.lock().insert(runtime.to_string());
    }

    pub fn set_build_delay(&self, delay: Duration) {
        *self.build_delay.lock() = delay;
    }

    pub fn built_jobs(&self) -> Vec<JobId> {
        self.built.lock().clone()
    }

    pub fn torn_down_jobs(&self) -> Vec<JobId> {
        self.torn_down.lock().clone()
    }
}

#[async_trait]
impl SandboxAdapter for FakeSandbox {
    async fn build(&self, request: BuildRequest) -> Result<LaunchSpec, SandboxError> {
        let delay = *self.build_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if request.abort.load(Ordering::SeqCst) {
            return Err(SandboxError::Aborted);
        }
        if let Some(manifest) = &request.manifest {
            if self.fail_runtimes.lock().contains(&manifest.name) {
                return Err(SandboxError::BuildFailed(format!(
                    "runtime {} is broken",
                    manifest.name
                )));
            }
        }
        self.built.lock().push(request.job_id.clone());
        Ok(LaunchSpec {
            job_id: request.job_id.clone(),
            command: request.command,
            args: request.args,
            env: request.env,
            cwd: request.workdir,
            rootfs: None,
            netns: None,
            cgroup_dir: None,
            artifacts: SandboxArtifacts {
                mounts: Vec::new(),
                sandbox_dir: None,
                cgroup_dir: None,
            },
        })
    }

    async fn teardown(&self, _artifacts: &SandboxArtifacts) {}
}

/// What one fake child will do.
#[derive(Debug, Clone)]
struct Behavior {
    delay: Duration,
    outcome: ExitOutcome,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Interprets launch specs instead of executing them.
pub struct FakeProcessAdapter {
    /// Wall time charged per `sleep` second.
    time_scale: Duration,
    next_pid: AtomicI32,
    spawn_fail: AtomicBool,
    launched: Mutex<Vec<JobId>>,
}

impl FakeProcessAdapter {
    pub fn new() -> Self {
        Self {
            time_scale: Duration::from_millis(10),
            next_pid: AtomicI32::new(1000),
            spawn_fail: AtomicBool::new(false),
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_time_scale(mut self, scale: Duration) -> Self {
        self.time_scale = scale;
        self
    }

    /// Make the next launches fail with SpawnFailed.
    pub fn fail_spawns(&self, fail: bool) {
        self.spawn_fail.store(fail, Ordering::SeqCst);
    }

    pub fn launched_jobs(&self) -> Vec<JobId> {
        self.launched.lock().clone()
    }

    fn interpret(&self, spec: &LaunchSpec) -> Behavior {
        let args = &spec.args;
        match spec.command.as_str() {
            "echo" => Behavior {
                delay: Duration::ZERO,
                outcome: ExitOutcome::Exited(0),
                stdout: format!("{}\n", args.join(" ")).into_bytes(),
                stderr: Vec::new(),
            },
            // Scripts "run" instantly; install flows only care about the
            // exit status and the files the engine wrote around them.
            "true" | "bash" | "sh" => Behavior {
                delay: Duration::ZERO,
                outcome: ExitOutcome::Exited(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
            "false" => Behavior {
                delay: Duration::ZERO,
                outcome: ExitOutcome::Exited(1),
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
            "sleep" => {
                let seconds: f64 = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .unwrap_or(0.0);
                Behavior {
                    delay: self.time_scale.mul_f64(seconds),
                    outcome: ExitOutcome::Exited(0),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                }
            }
            "fail" => {
                let code: i32 = args.first().and_then(|a| a.parse().ok()).unwrap_or(1);
                Behavior {
                    delay: Duration::ZERO,
                    outcome: ExitOutcome::Exited(code),
                    stdout: Vec::new(),
                    stderr: b"failing as asked\n".to_vec(),
                }
            }
            other => Behavior {
                delay: Duration::ZERO,
                outcome: ExitOutcome::Exited(127),
                stdout: Vec::new(),
                stderr: format!("{other}: command not found\n").into_bytes(),
            },
        }
    }
}

impl Default for FakeProcessAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessAdapter for FakeProcessAdapter {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, SandboxError> {
        if self.spawn_fail.load(Ordering::SeqCst) {
            return Err(SandboxError::SpawnFailed("fake spawn failure".to_string()));
        }
        self.launched.lock().push(spec.job_id.clone());
        let behavior = self.interpret(spec);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Ok(ProcessHandle {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            stdout: Some(Box::new(Cursor::new(behavior.stdout.clone()))),
            stderr: Some(Box::new(Cursor::new(behavior.stderr.clone()))),
            control: Box::new(FakeControl {
                behavior,
                signal_rx,
                signal_tx,
            }),
        })
    }
}

struct FakeControl {
    behavior: Behavior,
    signal_rx: mpsc::UnboundedReceiver<i32>,
    signal_tx: mpsc::UnboundedSender<i32>,
}

#[async_trait]
impl ProcessControl for FakeControl {
    async fn wait(&mut self) -> Result<ExitOutcome, SandboxError> {
        tokio::select! {
            _ = tokio::time::sleep(self.behavior.delay) => Ok(self.behavior.outcome),
            signum = self.signal_rx.recv() => {
                // The fake child dies on the first signal it receives.
                Ok(ExitOutcome::Signaled(signum.unwrap_or(9)))
            }
        }
    }

    fn signal(&self, signum: i32) -> Result<(), SandboxError> {
        let _ = self.signal_tx.send(signum);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
