// SPDX-License-Identifier: MIT

//! Engine wiring and the operations the API surface calls.
//!
//! Every collaborator is constructed at startup and passed in explicitly;
//! the engine owns shared state behind fine-grained locks and hands the
//! scheduler loop its event channel. Methods here are synchronous and
//! lock-scoped so the daemon listener can call them directly; anything
//! that touches the filesystem or a process runs in spawned tasks owned
//! by the scheduler side.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use joblet_core::{
    validate_cidr, validate_volume_name, Clock, EngineEvent, Job, JobId, JobSpec, JobStatus,
    LogChannel, Network, RuntimeManifest, StopReason, TransitionEvent, Volume, VolumeKind,
    Workflow, WorkflowId, BRIDGE_NETWORK, HOST_NETWORK, HOST_RUNTIME,
};
use joblet_sandbox::{HostResources, ProcessAdapter, SandboxAdapter};
use joblet_storage::StateStore;

use crate::error::EngineError;
use crate::jobs::JobStore;
use crate::ledger::ResourceLedger;
use crate::logbus::{LogBus, LogSubscription, DEFAULT_RING_CAPACITY};
use crate::metrics::MetricsHub;
use crate::registry::RuntimeRegistry;
use crate::resolver::WorkflowEntry;
use crate::vault::SecretVault;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub node_id: String,
    /// Worker parallelism cap (simultaneous RUNNING jobs).
    pub workers: usize,
    /// SIGTERM → SIGKILL grace window.
    pub grace: Duration,
    /// Terminal jobs kept in memory before retention eviction.
    pub retention_terminal: usize,
    /// Per-job log ring capacity.
    pub ring_capacity: usize,
    /// Log file flush cadence.
    pub flush_interval: Duration,
    /// Minimum gap between workflow retry attempts.
    pub retry_gap: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_id: "node-0".to_string(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            grace: Duration::from_secs(10),
            retention_terminal: 2048,
            ring_capacity: DEFAULT_RING_CAPACITY,
            flush_interval: Duration::from_millis(250),
            retry_gap: Duration::from_secs(1),
        }
    }
}

/// The execution core: registries, ledger, stores, and the channels that
/// drive the scheduler loop.
pub struct Engine<S, P, C> {
    pub(crate) config: EngineConfig,
    pub(crate) clock: C,
    pub(crate) sandbox: S,
    pub(crate) processes: P,
    pub(crate) seq: AtomicU64,
    pub(crate) registry: RuntimeRegistry,
    pub(crate) ledger: ResourceLedger,
    pub(crate) store: JobStore,
    pub(crate) logbus: LogBus,
    pub(crate) vault: SecretVault,
    pub(crate) volumes: Mutex<BTreeMap<String, Volume>>,
    pub(crate) networks: Mutex<BTreeMap<String, Network>>,
    pub(crate) workflows: Mutex<HashMap<WorkflowId, WorkflowEntry>>,
    /// Reverse dependency edges: dependency → dependents.
    pub(crate) dependents: Mutex<HashMap<JobId, Vec<JobId>>>,
    pub(crate) storage: StateStore,
    pub(crate) event_tx: mpsc::UnboundedSender<EngineEvent>,
    /// Worker slots in use (jobs admitted and not yet terminal).
    pub(crate) running: AtomicUsize,
    pub(crate) abort_flags: Mutex<HashMap<JobId, Arc<AtomicBool>>>,
    /// Signal channels into live supervisors.
    pub(crate) supervisors: Mutex<HashMap<JobId, mpsc::UnboundedSender<i32>>>,
    /// Stop intents recorded while a job is INITIALIZING/RUNNING, so exit
    /// classification knows the death was asked for.
    pub(crate) stop_intents: Mutex<HashMap<JobId, StopReason>>,
    /// Workflow step timeouts, armed when the job enters RUNNING.
    pub(crate) timeouts: Mutex<HashMap<JobId, Duration>>,
    /// Runtime-install meta-jobs → runtime name.
    pub(crate) pending_installs: Mutex<HashMap<JobId, String>>,
    pub(crate) metrics: MetricsHub,
}

impl<S, P, C> Engine<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    /// Wire up an engine. Recovers persisted observable state (terminal
    /// jobs, workflows, volumes) and seeds the built-in networks.
    /// Returns the engine plus the event receiver for the scheduler loop.
    pub fn new(
        config: EngineConfig,
        clock: C,
        sandbox: S,
        processes: P,
        host: HostResources,
        storage: StateStore,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>), EngineError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let logs_dir = storage.layout().logs_dir();

        let engine = Self {
            clock,
            sandbox,
            processes,
            seq: AtomicU64::new(1),
            registry: RuntimeRegistry::new(),
            ledger: ResourceLedger::new(host),
            store: JobStore::new(),
            logbus: LogBus::new(logs_dir, config.ring_capacity),
            vault: SecretVault::new(),
            volumes: Mutex::new(BTreeMap::new()),
            networks: Mutex::new(BTreeMap::new()),
            workflows: Mutex::new(HashMap::new()),
            dependents: Mutex::new(HashMap::new()),
            storage,
            event_tx,
            running: AtomicUsize::new(0),
            abort_flags: Mutex::new(HashMap::new()),
            supervisors: Mutex::new(HashMap::new()),
            stop_intents: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashMap::new()),
            pending_installs: Mutex::new(HashMap::new()),
            metrics: MetricsHub::new(),
            config,
        };

        {
            let mut networks = engine.networks.lock();
            networks.insert(HOST_NETWORK.to_string(), Network::builtin(HOST_NETWORK));
            networks.insert(BRIDGE_NETWORK.to_string(), Network::builtin(BRIDGE_NETWORK));
        }

        engine.recover()?;
        Ok((Arc::new(engine), event_rx))
    }

    /// Reload persisted state. Best-effort: corrupt records were already
    /// skipped by the store; records caught mid-flight by a crash are
    /// coerced to STOPPED so the store never resurrects a phantom runner.
    fn recover(&self) -> Result<(), EngineError> {
        let mut max_seq = 0;
        for mut job in self.storage.load_jobs()? {
            max_seq = max_seq.max(job.seq);
            if !job.is_terminal() {
                job.status = JobStatus::Stopped;
                job.stop_reason = Some(StopReason::Shutdown);
                job.ended_at = job.ended_at.or(Some(self.clock.utc_now()));
                let _ = self.storage.write_job(&job);
            }
            self.store.insert(job);
        }
        self.seq.store(max_seq + 1, Ordering::SeqCst);

        for workflow in self.storage.load_workflows()? {
            self.workflows
                .lock()
                .insert(workflow.id.clone(), WorkflowEntry::recovered(workflow));
        }

        let volumes_dir = self.storage.layout().volumes_dir();
        if let Ok(entries) = std::fs::read_dir(&volumes_dir) {
            let mut volumes = self.volumes.lock();
            for entry in entries.flatten() {
                let meta_path = entry.path().join(".volume.json");
                if let Ok(bytes) = std::fs::read(&meta_path) {
                    if let Ok(mut volume) = serde_json::from_slice::<Volume>(&bytes) {
                        volume.in_use = 0;
                        volumes.insert(volume.name.clone(), volume);
                    }
                }
            }
        }

        tracing::info!(
            jobs = self.store.len(),
            workflows = self.workflows.lock().len(),
            "recovered persisted state"
        );
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn registry(&self) -> &RuntimeRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn job_count(&self) -> usize {
        self.store.len()
    }

    /// WAITING in the spec's sense: QUEUED behind an unresolved
    /// dependency (not merely queued for resources).
    pub fn is_waiting(&self, job: &Job) -> bool {
        job.is_waiting(|id| self.store.get(id).map(|dependency| dependency.status))
    }

    /// Flush every dirty job log file (driven by the daemon's flusher).
    pub fn logbus_flush_all(&self) {
        self.logbus.flush_all();
    }

    pub fn watch_transitions(&self) -> broadcast::Receiver<TransitionEvent> {
        self.store.watch_transitions()
    }

    pub(crate) fn send_event(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Ask the scheduler loop to begin orderly shutdown.
    pub fn send_shutdown(&self) {
        self.send_event(EngineEvent::Shutdown);
    }

    // === Job operations ===

    /// Submit a job. Validation failures surface before any state is
    /// touched; on success the job is QUEUED and the scheduler is woken.
    pub fn submit_job(
        &self,
        spec: JobSpec,
        secret_env: Vec<(String, String)>,
    ) -> Result<Job, EngineError> {
        self.submit_internal(spec, secret_env, None, None)
    }

    pub(crate) fn submit_internal(
        &self,
        spec: JobSpec,
        secret_env: Vec<(String, String)>,
        workflow_id: Option<WorkflowId>,
        timeout: Option<Duration>,
    ) -> Result<Job, EngineError> {
        if spec.command.is_empty() {
            return Err(EngineError::InvalidRequest("empty command".to_string()));
        }
        spec.resources
            .validate()
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;

        let runtime = spec.runtime.as_deref().unwrap_or(HOST_RUNTIME);
        if runtime != HOST_RUNTIME && !self.registry.contains(runtime) {
            return Err(EngineError::UnknownRuntime(runtime.to_string()));
        }

        if let Some(network) = spec.network.as_deref() {
            if !self.networks.lock().contains_key(network) {
                return Err(EngineError::InvalidRequest(format!(
                    "unknown network: {network}"
                )));
            }
        }

        {
            let volumes = self.volumes.lock();
            for name in &spec.volumes {
                if !volumes.contains_key(name) {
                    return Err(EngineError::InvalidRequest(format!(
                        "unknown volume: {name}"
                    )));
                }
            }
        }

        for dep in &spec.depends_on {
            if !self.store.contains(&dep.job_id) {
                return Err(EngineError::InvalidRequest(format!(
                    "unknown dependency: {}",
                    dep.job_id
                )));
            }
        }

        let id = JobId::generate();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let job = Job::from_spec(
            id.clone(),
            seq,
            spec,
            workflow_id,
            self.config.node_id.clone(),
            self.clock.utc_now(),
        );

        {
            let mut volumes = self.volumes.lock();
            for name in &job.volumes {
                if let Some(volume) = volumes.get_mut(name) {
                    volume.in_use += 1;
                }
            }
        }
        {
            let mut dependents = self.dependents.lock();
            for dep in &job.depends_on {
                dependents
                    .entry(dep.job_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        if let Some(timeout) = timeout {
            self.timeouts.lock().insert(id.clone(), timeout);
        }

        self.vault.put(&id, secret_env);
        self.store.insert(job.clone());
        self.append_log(&id, LogChannel::System, "job submitted");
        self.send_event(EngineEvent::JobSubmitted { id });
        Ok(job)
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job, EngineError> {
        self.store
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("job {id}")))
    }

    /// Jobs page plus total count. `filter` matches on status name.
    pub fn list_jobs(
        &self,
        page: usize,
        size: usize,
        filter: Option<&str>,
    ) -> (Vec<Job>, usize) {
        let jobs: Vec<Job> = self
            .store
            .all()
            .into_iter()
            .filter(|job| match filter {
                Some(f) => job.status.to_string() == f,
                None => true,
            })
            .collect();
        let total = jobs.len();
        let size = size.max(1);
        let start = page.saturating_mul(size).min(total);
        let end = (start + size).min(total);
        (jobs[start..end].to_vec(), total)
    }

    /// Request a stop. Validation is synchronous; the stop itself is
    /// serialized through the scheduler loop.
    pub fn stop_job(&self, id: &JobId) -> Result<(), EngineError> {
        let job = self.get_job(id)?;
        if job.is_terminal() {
            return Err(EngineError::AlreadyTerminal(id.to_string()));
        }
        self.send_event(EngineEvent::StopRequested {
            id: id.clone(),
            reason: StopReason::UserRequested,
        });
        Ok(())
    }

    /// Delete a terminal job: memory, log bus, and disk records.
    pub fn delete_job(&self, id: &JobId) -> Result<(), EngineError> {
        let job = self.get_job(id)?;
        if !job.is_terminal() {
            return Err(EngineError::StillRunning(id.to_string()));
        }
        self.store.remove(id);
        self.logbus.close(id, true);
        self.vault.erase(id);
        self.dependents.lock().remove(id);
        self.storage.delete_job(id.as_str())?;
        Ok(())
    }

    /// Delete all non-running jobs. Not atomic: per-job success/failure.
    pub fn delete_all_jobs(&self) -> (usize, usize) {
        let mut deleted = 0;
        let mut skipped = 0;
        for job in self.store.all() {
            match self.delete_job(&job.id) {
                Ok(()) => deleted += 1,
                Err(_) => skipped += 1,
            }
        }
        (deleted, skipped)
    }

    /// Subscribe to a job's log stream.
    pub fn stream_logs(
        &self,
        id: &JobId,
        from_sequence: i64,
    ) -> Result<LogSubscription, EngineError> {
        // The job must exist, but may be terminal (history replay).
        let _ = self.get_job(id)?;
        Ok(self.logbus.subscribe(id, from_sequence))
    }

    pub(crate) fn append_log(&self, id: &JobId, channel: LogChannel, message: impl Into<String>) {
        self.logbus
            .append(id, channel, message, self.clock.epoch_ms());
    }

    // === Runtimes ===

    pub fn list_runtimes(&self) -> Vec<RuntimeManifest> {
        self.registry.list()
    }

    /// Remove a runtime; fails while any non-terminal job references it.
    pub fn remove_runtime(&self, name: &str) -> Result<(), EngineError> {
        let referenced = self
            .store
            .all()
            .iter()
            .any(|job| !job.is_terminal() && job.runtime == name);
        if referenced {
            return Err(EngineError::InUse(format!("runtime {name}")));
        }
        self.registry.unregister(name)?;
        let dir = self.storage.layout().runtime_dir(name);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(runtime = name, error = %e, "runtime tree removal failed");
            }
        }
        Ok(())
    }

    // === Volumes ===

    pub fn create_volume(
        &self,
        name: &str,
        size: &str,
        kind: VolumeKind,
    ) -> Result<Volume, EngineError> {
        validate_volume_name(name).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        let size_bytes =
            joblet_core::parse_size(size).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;

        let mut volumes = self.volumes.lock();
        if volumes.contains_key(name) {
            return Err(EngineError::DuplicateName(format!("volume {name}")));
        }
        let volume = Volume::new(name, kind, size_bytes, self.clock.utc_now());
        if kind == VolumeKind::Filesystem {
            let dir = self.storage.layout().volume_dir(name);
            std::fs::create_dir_all(&dir)
                .map_err(|e| EngineError::Internal(format!("volume dir: {e}")))?;
            let meta = serde_json::to_vec_pretty(&volume)
                .map_err(|e| EngineError::Internal(e.to_string()))?;
            std::fs::write(dir.join(".volume.json"), meta)
                .map_err(|e| EngineError::Internal(format!("volume meta: {e}")))?;
        }
        volumes.insert(name.to_string(), volume.clone());
        tracing::info!(volume = name, %kind, size_bytes, "created volume");
        Ok(volume)
    }

    /// Auto-create missing workflow volumes: filesystem kind, unsized.
    pub(crate) fn create_volume_default(&self, name: &str) -> Result<(), EngineError> {
        self.create_volume(name, "0B", VolumeKind::Filesystem)
            .map(|_| ())
    }

    pub fn delete_volume(&self, name: &str) -> Result<(), EngineError> {
        let mut volumes = self.volumes.lock();
        let volume = volumes
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("volume {name}")))?;
        if volume.in_use > 0 {
            return Err(EngineError::InUse(format!(
                "volume {name} ({} jobs)",
                volume.in_use
            )));
        }
        let kind = volume.kind;
        volumes.remove(name);
        drop(volumes);
        if kind == VolumeKind::Filesystem {
            let dir = self.storage.layout().volume_dir(name);
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(volume = name, error = %e, "volume dir removal failed");
                }
            }
        }
        Ok(())
    }

    pub fn list_volumes(&self) -> Vec<Volume> {
        self.volumes.lock().values().cloned().collect()
    }

    // === Networks ===

    pub fn create_network(&self, name: &str, cidr: &str) -> Result<Network, EngineError> {
        validate_cidr(cidr).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        let mut networks = self.networks.lock();
        if networks.contains_key(name) {
            return Err(EngineError::DuplicateName(format!("network {name}")));
        }
        let network =
            Network::named(name, cidr).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        networks.insert(name.to_string(), network.clone());
        tracing::info!(network = name, cidr, "created network");
        Ok(network)
    }

    pub fn delete_network(&self, name: &str) -> Result<(), EngineError> {
        let mut networks = self.networks.lock();
        let network = networks
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("network {name}")))?;
        if network.builtin {
            return Err(EngineError::InvalidRequest(format!(
                "built-in network {name} cannot be deleted"
            )));
        }
        let referenced = self
            .store
            .all()
            .iter()
            .any(|job| !job.is_terminal() && job.network == name);
        if referenced {
            return Err(EngineError::InUse(format!("network {name}")));
        }
        networks.remove(name);
        Ok(())
    }

    pub fn list_networks(&self) -> Vec<Network> {
        self.networks.lock().values().cloned().collect()
    }

    // === Workflows (submission lives in resolver.rs) ===

    pub fn get_workflow(&self, id: &WorkflowId) -> Result<(Workflow, Vec<Job>), EngineError> {
        let workflows = self.workflows.lock();
        let entry = workflows
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("workflow {id}")))?;
        let children = entry
            .workflow
            .jobs
            .iter()
            .filter_map(|job_id| self.store.get(job_id))
            .collect();
        Ok((entry.workflow.clone(), children))
    }

    pub fn list_workflows(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .lock()
            .values()
            .map(|entry| entry.workflow.clone())
            .collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        workflows
    }

    /// Cancel a workflow: running children get SIGTERM, pending children
    /// stop with `WorkflowCancelled`, nothing is retried.
    pub fn cancel_workflow(&self, id: &WorkflowId) -> Result<(), EngineError> {
        {
            let mut workflows = self.workflows.lock();
            let entry = workflows
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(format!("workflow {id}")))?;
            entry.cancelled = true;
        }
        self.send_event(EngineEvent::WorkflowDirty { id: id.clone() });
        Ok(())
    }

    // === Shared terminal bookkeeping ===

    /// Housekeeping common to every terminal transition. Safe to call
    /// exactly once per job; the caller has already committed the state.
    pub(crate) fn finalize_terminal(&self, job: &Job) {
        self.ledger.release(&job.id);
        self.vault.erase(&job.id);
        self.abort_flags.lock().remove(&job.id);
        self.supervisors.lock().remove(&job.id);
        self.stop_intents.lock().remove(&job.id);
        self.timeouts.lock().remove(&job.id);
        {
            let mut volumes = self.volumes.lock();
            for name in &job.volumes {
                if let Some(volume) = volumes.get_mut(name) {
                    volume.in_use = volume.in_use.saturating_sub(1);
                }
            }
        }
        self.logbus.flush(&job.id);
        if let Err(e) = self.storage.write_job(job) {
            tracing::warn!(job_id = %job.id, error = %e, "job record write failed");
        }
        self.enforce_retention();
        self.send_event(EngineEvent::JobTerminal {
            id: job.id.clone(),
            status: job.status,
        });
    }

    /// Evict the oldest terminal jobs beyond the retention cap. Disk
    /// records survive; memory, ring, and vault entries go.
    fn enforce_retention(&self) {
        let all = self.store.all();
        let terminal: Vec<&Job> = all.iter().filter(|job| job.is_terminal()).collect();
        if terminal.len() <= self.config.retention_terminal {
            return;
        }
        let excess = terminal.len() - self.config.retention_terminal;
        for job in terminal.into_iter().take(excess) {
            tracing::debug!(job_id = %job.id, "retention eviction");
            self.store.remove(&job.id);
            self.logbus.close(&job.id, false);
            self.vault.erase(&job.id);
            self.dependents.lock().remove(&job.id);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
