// SPDX-License-Identifier: MIT

//! Process launching with namespace entry and a pidfd.
//!
//! The child is built as a `std::process::Command` so `pre_exec` can run
//! namespace and cgroup setup post-fork, then converted to a
//! `tokio::process::Command` for async wait and stdio. std's spawn blocks
//! until exec and reports pre_exec/exec failures synchronously through its
//! internal CLOEXEC pipe, which is exactly the execve barrier the
//! supervisor wants: `launch` returns only once the child is inside the
//! sandbox, or with the reason it never got there. The child enrolls
//! itself in its cgroup (writing `0` to `cgroup.procs`) before exec, so
//! every cycle it burns is accounted.

use async_trait::async_trait;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use crate::adapter::{
    ExitOutcome, LaunchSpec, ProcessAdapter, ProcessControl, ProcessHandle, SandboxError,
};

/// Spawns jobs on the live host.
#[derive(Debug, Clone, Default)]
pub struct LinuxProcessAdapter;

impl LinuxProcessAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Open a pidfd for signal-safe exit observation.
#[allow(unsafe_code)]
fn pidfd_open(pid: i32) -> io::Result<OwnedFd> {
    // SAFETY: pidfd_open takes a pid and flags and returns a new fd; no
    // pointers are involved. Ownership of the returned fd is taken
    // immediately.
    let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

#[async_trait]
impl ProcessAdapter for LinuxProcessAdapter {
    #[allow(unsafe_code)]
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, SandboxError> {
        // Namespace file for setns, opened in the parent so pre_exec only
        // needs the raw fd. std opens with O_CLOEXEC, which is exactly
        // right: alive through pre_exec, gone after exec.
        let netns_file: Option<std::fs::File> = match &spec.netns {
            Some(path) => Some(std::fs::File::open(path).map_err(|e| {
                SandboxError::SpawnFailed(format!("open netns {}: {e}", path.display()))
            })?),
            None => None,
        };

        let mut cmd = std::process::Command::new(&spec.command);
        cmd.args(&spec.args)
            .env_clear()
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let rootfs = spec.rootfs.clone();
        let cwd = spec.cwd.clone();
        let cgroup_procs = spec.cgroup_dir.as_ref().map(|d| d.join("cgroup.procs"));
        let netns_raw = netns_file.as_ref().map(|f| f.as_raw_fd());

        // SAFETY: the closure runs in the forked child before exec. It
        // only performs raw syscalls (setsid, unshare, setns, mount,
        // chroot, chdir, rlimit) and short writes to already-resolvable
        // paths, the same post-fork pattern the kernel docs bless for
        // single-threaded children.
        unsafe {
            cmd.pre_exec(move || {
                use nix::mount::{mount, MsFlags};
                use nix::sched::{setns, unshare, CloneFlags};
                use nix::sys::resource::{setrlimit, Resource};

                nix::unistd::setsid().map_err(io_err("setsid"))?;

                setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(io_err("setrlimit"))?;

                // Enroll in the cgroup before exec; "0" means "this
                // process".
                if let Some(procs) = &cgroup_procs {
                    std::fs::write(procs, "0").map_err(|e| {
                        io::Error::other(format!("cgroup.procs: {e}"))
                    })?;
                }

                unshare(CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID)
                    .map_err(io_err("unshare"))?;

                if let Some(fd) = netns_raw {
                    // SAFETY: the fd was opened in the parent and is held
                    // open by `netns_file` across the fork.
                    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
                    setns(borrowed, CloneFlags::CLONE_NEWNET).map_err(io_err("setns"))?;
                }

                if let Some(rootfs) = &rootfs {
                    // Stop mount events leaking back to the host, then
                    // pivot into the prepared tree.
                    mount(
                        None::<&str>,
                        "/",
                        None::<&str>,
                        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
                        None::<&str>,
                    )
                    .map_err(io_err("mount private"))?;
                    nix::unistd::chroot(rootfs.as_path()).map_err(io_err("chroot"))?;
                }
                nix::unistd::chdir(std::path::Path::new(&cwd)).map_err(io_err("chdir"))?;

                Ok(())
            });
        }

        let mut tokio_cmd = tokio::process::Command::from(cmd);
        let mut child = tokio_cmd
            .spawn()
            .map_err(|e| SandboxError::SpawnFailed(format!("spawn {}: {e}", spec.command)))?;

        let pid = child.id().ok_or_else(|| {
            SandboxError::SpawnFailed("child exited before launch completed".to_string())
        })?;

        let pidfd = match pidfd_open(pid as i32) {
            Ok(fd) => AsyncFd::with_interest(fd, Interest::READABLE)
                .map_err(|e| tracing::debug!(error = %e, "pidfd registration failed"))
                .ok(),
            Err(e) => {
                tracing::debug!(error = %e, "pidfd_open failed, falling back to child wait");
                None
            }
        };

        let stdout = child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn tokio::io::AsyncRead + Send + Unpin>);
        let stderr = child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn tokio::io::AsyncRead + Send + Unpin>);

        tracing::debug!(job_id = %spec.job_id, pid, "child entered sandbox");

        Ok(ProcessHandle {
            pid: pid as i32,
            stdout,
            stderr,
            control: Box::new(LinuxProcessControl {
                child,
                pidfd,
                pgid: pid as i32,
            }),
        })
    }
}

fn io_err<E: std::fmt::Display>(what: &'static str) -> impl Fn(E) -> io::Error {
    move |e| io::Error::other(format!("{what}: {e}"))
}

struct LinuxProcessControl {
    child: tokio::process::Child,
    pidfd: Option<AsyncFd<OwnedFd>>,
    /// The child is a session leader (setsid), so its pid is the pgid.
    pgid: i32,
}

#[async_trait]
impl ProcessControl for LinuxProcessControl {
    async fn wait(&mut self) -> Result<ExitOutcome, SandboxError> {
        // A pidfd polls readable exactly when the child terminates; the
        // actual reap still goes through the tokio child so no waitpid
        // races with the runtime's own reaping.
        if let Some(pidfd) = &self.pidfd {
            if let Ok(guard) = pidfd.readable().await {
                drop(guard);
            }
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SandboxError::SandboxCorrupted(format!("wait: {e}")))?;
        Ok(match status.code() {
            Some(code) => ExitOutcome::Exited(code),
            None => ExitOutcome::Signaled(status.signal().unwrap_or(libc::SIGKILL)),
        })
    }

    fn signal(&self, signum: i32) -> Result<(), SandboxError> {
        let signal = Signal::try_from(signum)
            .map_err(|e| SandboxError::SandboxCorrupted(format!("bad signal {signum}: {e}")))?;
        killpg(Pid::from_raw(self.pgid), signal)
            .map_err(|e| SandboxError::SandboxCorrupted(format!("killpg: {e}")))
    }
}
