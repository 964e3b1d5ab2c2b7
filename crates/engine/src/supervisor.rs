// SPDX-License-Identifier: MIT

//! Per-job placement and supervision tasks.
//!
//! `place` runs once per admitted job: build the sandbox, launch the
//! child, then hand off to `supervise`, which tees stdio into the log
//! bus, collects the exit, releases sandbox artifacts, and commits the
//! terminal transition. Each job owns exactly one supervisor task; the
//! scheduler talks to it only through its signal channel.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use joblet_core::{Clock, EngineEvent, JobId, JobStatus, LogChannel, Reservation, StopReason};
use joblet_sandbox::{
    ExitOutcome, ProcessAdapter, ProcessHandle, SandboxAdapter, SandboxArtifacts, SandboxError,
};

use crate::engine::Engine;
use crate::jobs::TransitionAttrs;

const SIGKILL: i32 = 9;

impl<S, P, C> Engine<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    /// Place an admitted job: INITIALIZING → RUNNING → terminal.
    ///
    /// Owns the worker slot taken at admission and releases it on every
    /// path out.
    pub(crate) async fn place(self: Arc<Self>, id: JobId, reservation: Reservation) {
        let Some(job) = self.store.get(&id) else {
            self.release_slot();
            self.ledger.release(&id);
            return;
        };

        let abort = self.abort_flag(&id);
        let request = match self.build_request(&job, reservation, Arc::clone(&abort)).await {
            Ok(request) => request,
            Err(e) => {
                self.fail_placement(&id, &e, &SandboxArtifacts::default()).await;
                return;
            }
        };

        let spec = match self.sandbox.build(request).await {
            Ok(spec) => spec,
            Err(e) => {
                // The builder has already unwound its partial work.
                self.fail_placement(&id, &e, &SandboxArtifacts::default()).await;
                return;
            }
        };

        if abort.load(Ordering::SeqCst) {
            self.sandbox.teardown(&spec.artifacts).await;
            self.fail_placement(&id, &SandboxError::Aborted, &SandboxArtifacts::default())
                .await;
            return;
        }

        let handle = match self.processes.launch(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                self.sandbox.teardown(&spec.artifacts).await;
                self.fail_placement(&id, &e, &SandboxArtifacts::default()).await;
                return;
            }
        };

        let started_at = self.clock.utc_now();
        match self.store.transition(
            &id,
            JobStatus::Initializing,
            JobStatus::Running,
            TransitionAttrs {
                started_at: Some(started_at),
                ..Default::default()
            },
        ) {
            Ok(_) => {}
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "running transition refused");
                let _ = handle.control.signal(SIGKILL);
                self.sandbox.teardown(&spec.artifacts).await;
                self.release_slot();
                self.ledger.release(&id);
                return;
            }
        }

        self.append_log(&id, LogChannel::System, format!("started pid={}", handle.pid));
        self.send_event(EngineEvent::JobStarted { id: id.clone() });
        self.supervise(id, handle, spec.artifacts).await;
    }

    /// Classify and commit a placement failure (build or spawn phase).
    async fn fail_placement(
        &self,
        id: &JobId,
        error: &SandboxError,
        artifacts: &SandboxArtifacts,
    ) {
        if !artifacts.is_empty() {
            self.sandbox.teardown(artifacts).await;
        }

        let stop_reason = match error {
            SandboxError::Aborted => Some(
                self.stop_intents
                    .lock()
                    .get(id)
                    .copied()
                    .unwrap_or(StopReason::UserRequested),
            ),
            _ => None,
        };

        let (to, message) = match (&stop_reason, error) {
            (Some(reason), _) => (JobStatus::Stopped, format!("build aborted ({reason})")),
            (None, SandboxError::SpawnFailed(msg)) => {
                (JobStatus::Failed, format!("spawn failed: {msg}"))
            }
            (None, e) => (JobStatus::Failed, format!("build failed: {e}")),
        };
        self.append_log(id, LogChannel::System, message.as_str());

        let attrs = TransitionAttrs {
            ended_at: Some(self.clock.utc_now()),
            stop_reason,
            ..Default::default()
        };
        match self
            .store
            .transition(id, JobStatus::Initializing, to, attrs)
        {
            Ok(job) => {
                self.release_slot();
                self.finalize_terminal(&job);
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "failure transition refused");
                self.release_slot();
                self.ledger.release(id);
            }
        }
    }

    /// Supervise a running child to its terminal state.
    async fn supervise(
        self: Arc<Self>,
        id: JobId,
        mut handle: ProcessHandle,
        artifacts: SandboxArtifacts,
    ) {
        // Register the signal channel the scheduler uses for stop and
        // kill-escalation.
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<i32>();
        self.supervisors.lock().insert(id.clone(), signal_tx);

        let stdout_task = handle.stdout.take().map(|stream| {
            tokio::spawn(Self::tee(
                Arc::clone(&self),
                id.clone(),
                stream,
                LogChannel::Stdout,
            ))
        });
        let stderr_task = handle.stderr.take().map(|stream| {
            tokio::spawn(Self::tee(
                Arc::clone(&self),
                id.clone(),
                stream,
                LogChannel::Stderr,
            ))
        });

        // Wait for exit, forwarding signals as they arrive.
        let outcome = loop {
            tokio::select! {
                outcome = handle.control.wait() => break outcome,
                Some(signum) = signal_rx.recv() => {
                    self.append_log(&id, LogChannel::System, format!("delivering signal {signum}"));
                    if let Err(e) = handle.control.signal(signum) {
                        tracing::warn!(job_id = %id, signum, error = %e, "signal delivery failed");
                    }
                }
            }
        };

        // Drain stdio to EOF so trailing output lands before the exit
        // record.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "exit collection failed");
                ExitOutcome::Signaled(SIGKILL)
            }
        };

        match outcome {
            ExitOutcome::Exited(code) => {
                self.append_log(&id, LogChannel::System, format!("exited rc={code}"));
            }
            ExitOutcome::Signaled(signum) => {
                self.append_log(&id, LogChannel::System, format!("killed by signal {signum}"));
            }
        }

        self.sandbox.teardown(&artifacts).await;

        let stop_reason = self.stop_intents.lock().get(&id).copied();
        let (to, exit_code) = match stop_reason {
            Some(_) => (JobStatus::Stopped, None),
            None if outcome.success() => (JobStatus::Completed, Some(0)),
            None => (JobStatus::Failed, Some(outcome.exit_code())),
        };

        let attrs = TransitionAttrs {
            ended_at: Some(self.clock.utc_now()),
            exit_code,
            stop_reason,
            ..Default::default()
        };
        match self.store.transition(&id, JobStatus::Running, to, attrs) {
            Ok(job) => {
                self.release_slot();
                self.finalize_terminal(&job);
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "terminal transition refused");
                self.release_slot();
                self.ledger.release(&id);
            }
        }
    }

    /// Read a stdio pipe line-by-line into the log bus.
    async fn tee(
        engine: Arc<Self>,
        id: JobId,
        stream: Box<dyn AsyncRead + Send + Unpin>,
        channel: LogChannel,
    ) {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    engine.append_log(&id, channel, line);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(job_id = %id, error = %e, "stdio read error");
                    break;
                }
            }
        }
    }

    /// Send a signal to a job's supervisor, if one is live.
    pub(crate) fn signal_supervisor(&self, id: &JobId, signum: i32) {
        if let Some(tx) = self.supervisors.lock().get(id) {
            let _ = tx.send(signum);
        }
    }

    pub(crate) fn take_slot(&self) {
        self.running.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn release_slot(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}


#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
