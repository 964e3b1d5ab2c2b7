// SPDX-License-Identifier: MIT

//! The scheduler loop: event-driven admission under a worker cap.
//!
//! One task owns the timer table and processes engine events; admission
//! re-evaluates only when something changed (submission, release,
//! terminal, timer), never by polling. Placement work runs in spawned
//! per-job tasks; everything that must be serialized with admission
//! (stops, dependency cascades, retries) happens here.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use joblet_core::{
    Clock, EngineEvent, Job, JobId, JobStatus, LogChannel, StopReason, TimerId,
};
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};

use crate::engine::Engine;
use crate::jobs::TransitionAttrs;
use crate::timers::TimerTable;

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

/// How long shutdown waits for supervisors after the grace escalation.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

/// Runs the engine's event loop until shutdown.
pub struct Scheduler<S, P, C> {
    engine: Arc<Engine<S, P, C>>,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    timers: TimerTable,
}

impl<S, P, C> Scheduler<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    pub fn new(
        engine: Arc<Engine<S, P, C>>,
        event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        Self {
            engine,
            event_rx,
            timers: TimerTable::new(),
        }
    }

    /// Process events and timers until a Shutdown event arrives.
    pub async fn run(mut self) {
        loop {
            let deadline = self.timers.next_deadline();
            let event = match deadline {
                Some(deadline) => {
                    let now = self.engine.clock().now();
                    let sleep = deadline.saturating_duration_since(now);
                    tokio::select! {
                        event = self.event_rx.recv() => event,
                        _ = tokio::time::sleep(sleep) => None,
                    }
                }
                None => self.event_rx.recv().await,
            };

            match event {
                Some(EngineEvent::Shutdown) => {
                    self.shutdown().await;
                    return;
                }
                Some(event) => self.handle_event(event),
                // The engine owns the sender, so a closed channel means
                // the engine itself is gone.
                None => return,
            }

            // Drain whatever else is queued before re-admitting, so a
            // burst of submissions admits in one pass.
            while let Ok(event) = self.event_rx.try_recv() {
                if matches!(event, EngineEvent::Shutdown) {
                    self.shutdown().await;
                    return;
                }
                self.handle_event(event);
            }

            let now = self.engine.clock().now();
            for timer in self.timers.fired(now) {
                self.handle_timer(timer);
            }

            self.admit();
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::JobSubmitted { id } => {
                // A dependency may already be terminal in a contradicting
                // state; without this check the job would wait forever.
                if let Some(job) = self.engine.store.get(&id) {
                    let contradicted = job.depends_on.iter().any(|dep| {
                        self.engine
                            .store
                            .get(&dep.job_id)
                            .map(|d| dep.required.contradicted_by(d.status))
                            .unwrap_or(true)
                    });
                    if contradicted {
                        let engine = Arc::clone(&self.engine);
                        engine.stop_pending(
                            &job,
                            StopReason::DependencyUnsatisfied,
                            "dependency unsatisfied at submission",
                        );
                        return;
                    }
                }
                self.park_if_scheduled(&id);
            }
            EngineEvent::TimerFired { id } => self.handle_timer(id),
            EngineEvent::StopRequested { id, reason } => self.handle_stop(&id, reason),
            EngineEvent::JobStarted { id } => {
                let timeout = self.engine.timeouts.lock().get(&id).copied();
                if let Some(timeout) = timeout {
                    self.timers
                        .set(TimerId::timeout(&id), timeout, self.engine.clock().now());
                }
            }
            EngineEvent::JobTerminal { id, .. } => {
                self.timers.cancel(&TimerId::timeout(&id));
                self.timers.cancel(&TimerId::grace(&id));
                if let Some(job) = self.engine.store.get(&id) {
                    self.engine.resolve_terminal(&job, &mut self.timers);
                }
                self.engine.finish_install(&id);
            }
            EngineEvent::WorkflowDirty { id } => {
                let engine = Arc::clone(&self.engine);
                engine.enforce_workflow_cancel(&id, &mut self.timers);
            }
            EngineEvent::Shutdown => {}
        }
    }

    /// A submission with a future schedule time parks in SCHEDULED with a
    /// wake-up timer; it holds no reservation and no worker slot.
    fn park_if_scheduled(&mut self, id: &JobId) {
        let Some(job) = self.engine.store.get(id) else {
            return;
        };
        let Some(schedule_at) = job.schedule_at else {
            return;
        };
        let now_utc = self.engine.clock().utc_now();
        if schedule_at <= now_utc {
            // Past schedule times run immediately; stay QUEUED.
            return;
        }
        let delay = (schedule_at - now_utc)
            .to_std()
            .unwrap_or(Duration::ZERO);
        match self.engine.store.transition(
            id,
            JobStatus::Queued,
            JobStatus::Scheduled,
            TransitionAttrs::default(),
        ) {
            Ok(_) => {
                self.engine.append_log(
                    id,
                    LogChannel::System,
                    format!("parked until {}", schedule_at.to_rfc3339()),
                );
                self.timers
                    .set(TimerId::schedule(id), delay, self.engine.clock().now());
            }
            Err(e) => tracing::debug!(job_id = %id, error = %e, "park refused"),
        }
    }

    fn handle_timer(&mut self, timer: TimerId) {
        match timer.kind() {
            ("schedule", _job) => {
                // The job became admission-eligible; the admit pass below
                // picks it up.
            }
            ("timeout", job) => {
                let id = JobId::new(job);
                tracing::info!(job_id = %id, "step timeout reached");
                self.handle_stop(&id, StopReason::Timeout);
            }
            ("grace", job) => {
                let id = JobId::new(job);
                if let Some(job) = self.engine.store.get(&id) {
                    if !job.is_terminal() {
                        self.engine
                            .append_log(&id, LogChannel::System, "grace expired, sending SIGKILL");
                        self.engine.signal_supervisor(&id, SIGKILL);
                    }
                }
            }
            ("retry", rest) => {
                if let Some((workflow, step)) = rest.split_once('/') {
                    let workflow_id = joblet_core::WorkflowId::new(workflow);
                    self.engine.retry_step(&workflow_id, step);
                }
            }
            (kind, rest) => {
                tracing::warn!(kind, rest, "unknown timer fired");
            }
        }
    }

    /// Stop handling, serialized with admission.
    fn handle_stop(&mut self, id: &JobId, reason: StopReason) {
        let Some(job) = self.engine.store.get(id) else {
            return;
        };
        let engine = Arc::clone(&self.engine);
        engine.request_stop(&job, reason, &mut self.timers);
    }

    /// FIFO admission under the worker cap.
    fn admit(&mut self) {
        loop {
            if self.engine.running_count() >= self.engine.config().workers {
                return;
            }
            let now_utc = self.engine.clock().utc_now();

            // Oldest eligible job whose reservation can be satisfied.
            // On Insufficient the scan continues: a huge request queued
            // first must not wedge the node.
            let mut candidates: Vec<Job> = self
                .engine
                .store
                .all()
                .into_iter()
                .filter(|job| match job.status {
                    JobStatus::Queued => true,
                    JobStatus::Scheduled => true,
                    _ => false,
                })
                .filter(|job| job.schedule_at.map(|at| at <= now_utc).unwrap_or(true))
                .filter(|job| self.dependencies_satisfied(job))
                .collect();
            candidates.sort_by_key(|job| (job.created_at, job.seq));

            let mut admitted = false;
            for job in candidates {
                match self.engine.ledger.reserve(&job.id, &job.resources) {
                    Ok(reservation) => {
                        if self.begin_placement(&job, reservation) {
                            admitted = true;
                            break;
                        } else {
                            self.engine.ledger.release(&job.id);
                        }
                    }
                    Err(e) => {
                        tracing::trace!(job_id = %job.id, error = %e, "reservation unavailable");
                    }
                }
            }
            if !admitted {
                return;
            }
        }
    }

    fn dependencies_satisfied(&self, job: &Job) -> bool {
        job.depends_on.iter().all(|dep| {
            self.engine
                .store
                .get(&dep.job_id)
                .map(|dependency| dep.required.satisfied_by(dependency.status))
                .unwrap_or(false)
        })
    }

    /// Commit the admission transitions and spawn the placement task.
    /// Returns false if the job moved under us (stop race).
    fn begin_placement(&mut self, job: &Job, reservation: joblet_core::Reservation) -> bool {
        let id = &job.id;
        if job.status == JobStatus::Queued {
            if self
                .engine
                .store
                .transition(id, JobStatus::Queued, JobStatus::Scheduled, TransitionAttrs::default())
                .is_err()
            {
                return false;
            }
        }
        if self
            .engine
            .store
            .transition(
                id,
                JobStatus::Scheduled,
                JobStatus::Initializing,
                TransitionAttrs::default(),
            )
            .is_err()
        {
            return false;
        }
        self.timers.cancel(&TimerId::schedule(id));
        self.engine.take_slot();

        let engine = Arc::clone(&self.engine);
        let id = id.clone();
        tokio::spawn(async move {
            engine.place(id, reservation).await;
        });
        true
    }

    /// Orderly shutdown: SIGTERM every live job, escalate after grace,
    /// then drain.
    async fn shutdown(&mut self) {
        tracing::info!("scheduler shutting down");
        let engine = Arc::clone(&self.engine);
        let live: Vec<Job> = engine
            .store
            .all()
            .into_iter()
            .filter(|job| !job.is_terminal())
            .collect();
        for job in &live {
            engine.request_stop(job, StopReason::Shutdown, &mut self.timers);
        }

        let deadline = self.engine.clock().now() + self.engine.config().grace + SHUTDOWN_DRAIN;
        while self.engine.clock().now() < deadline {
            let any_live = self.engine.store.all().iter().any(|job| !job.is_terminal());
            if !any_live {
                break;
            }
            tokio::select! {
                event = self.event_rx.recv() => {
                    if let Some(event) = event {
                        if !matches!(event, EngineEvent::Shutdown) {
                            self.handle_event(event);
                        }
                    } else {
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            let now = self.engine.clock().now();
            for timer in self.timers.fired(now) {
                self.handle_timer(timer);
            }
        }
        self.engine.logbus.flush_all();
    }
}

impl<S, P, C> Engine<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    /// Apply a stop to a job according to its current state. Must run in
    /// the scheduler loop (takes the timer table).
    pub(crate) fn request_stop(&self, job: &Job, reason: StopReason, timers: &mut TimerTable) {
        match job.status {
            JobStatus::Queued | JobStatus::Scheduled => {
                self.stop_pending(job, reason, &format!("stopped ({reason})"));
                timers.cancel(&TimerId::schedule(&job.id));
            }
            JobStatus::Initializing => {
                self.stop_intents.lock().insert(job.id.clone(), reason);
                self.abort_flag(&job.id)
                    .store(true, std::sync::atomic::Ordering::SeqCst);
                self.append_log(&job.id, LogChannel::System, "aborting sandbox build");
            }
            JobStatus::Running => {
                self.stop_intents.lock().insert(job.id.clone(), reason);
                self.append_log(
                    &job.id,
                    LogChannel::System,
                    format!("stop requested ({reason}), sending SIGTERM"),
                );
                self.signal_supervisor(&job.id, SIGTERM);
                timers.set(TimerId::grace(&job.id), self.config.grace, self.clock.now());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
