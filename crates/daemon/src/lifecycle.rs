// SPDX-License-Identifier: MIT

//! Daemon lifecycle: startup, background tasks, shutdown.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, Notify};
use tracing::info;

use joblet_core::{EngineEvent, SystemClock};
use joblet_engine::{Engine, EngineConfig, EngineError, EngineMetrics, Scheduler};
use joblet_sandbox::{
    host, HostResources, LinuxProcessAdapter, LinuxSandbox, MetricsSampler,
};
use joblet_storage::{StateLayout, StateStore};

use crate::env::DaemonConfig;
use crate::listener::{load_tls_acceptor, Listener};

/// The daemon's concrete engine type.
pub type DaemonEngine = Engine<LinuxSandbox, LinuxProcessAdapter, SystemClock>;

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("another jobletd owns {0} (is the daemon already running?)")]
    LockFailed(String),
    #[error("engine startup failed: {0}")]
    Engine(#[from] EngineError),
    #[error("tls setup failed: {0}")]
    Tls(#[from] crate::listener::tls::TlsError),
}

/// Everything a running daemon owns.
pub struct Daemon {
    pub engine: Arc<DaemonEngine>,
    pub shutdown: Arc<Notify>,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    scheduler_events: Option<mpsc::UnboundedReceiver<EngineEvent>>,
}

/// Acquire the lock file, wire the engine, bind the sockets.
pub async fn startup(config: &DaemonConfig) -> Result<(Daemon, UnixListener), LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Exclusive lock: one daemon per state dir.
    let lock_path = config.lock_path();
    let mut lock_file = File::create(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(lock_path.display().to_string()))?;
    writeln!(lock_file, "{}", std::process::id())?;

    let storage = StateStore::new(StateLayout::new(&config.state_dir)).map_err(EngineError::from)?;
    let host_resources = HostResources::discover();
    let io_device = host::backing_device(&config.state_dir);

    let mut engine_config = EngineConfig {
        node_id: hostname(),
        ..Default::default()
    };
    if let Some(workers) = config.workers {
        engine_config.workers = workers;
    }

    let sandbox = LinuxSandbox::new(storage.layout().sandboxes_dir(), io_device);
    let (engine, event_rx) = Engine::new(
        engine_config,
        SystemClock,
        sandbox,
        LinuxProcessAdapter::new(),
        host_resources,
        storage,
    )?;

    // Bind the Unix socket, replacing any stale file (the lock already
    // proved no other daemon is alive).
    let socket_path = config.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix_listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "listening");

    Ok((
        Daemon {
            engine,
            shutdown: Arc::new(Notify::new()),
            lock_file,
            scheduler_events: Some(event_rx),
        },
        unix_listener,
    ))
}

impl Daemon {
    /// Spawn the listener(s) and background tasks, then run the scheduler
    /// loop to completion.
    pub async fn run(
        mut self,
        config: &DaemonConfig,
        unix_listener: UnixListener,
    ) -> Result<(), LifecycleError> {
        let listener = Arc::new(Listener::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.shutdown),
        ));
        tokio::spawn(Arc::clone(&listener).run_unix(unix_listener));

        if let Some(addr) = config.listen_addr {
            let acceptor = match &config.tls {
                Some(paths) => Some(load_tls_acceptor(paths)?),
                None => None,
            };
            let tcp = TcpListener::bind(addr).await?;
            info!(%addr, tls = acceptor.is_some(), "listening");
            tokio::spawn(Arc::clone(&listener).run_tcp(tcp, acceptor));
        }

        spawn_flusher(Arc::clone(&self.engine), Arc::clone(&self.shutdown));
        spawn_metrics_sampler(Arc::clone(&self.engine), Arc::clone(&self.shutdown));

        let event_rx = self
            .scheduler_events
            .take()
            .ok_or_else(|| EngineError::Internal("scheduler already running".to_string()))?;
        Scheduler::new(Arc::clone(&self.engine), event_rx).run().await;

        // The scheduler returned: shutdown is complete. Stop the
        // listeners and background tasks, then clean up the socket.
        self.shutdown.notify_waiters();
        let _ = std::fs::remove_file(config.socket_path());
        info!("daemon stopped");
        Ok(())
    }
}

/// Periodic log-file flusher (buffered appends become durable here or at
/// job terminal, whichever comes first).
fn spawn_flusher(engine: Arc<DaemonEngine>, shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        let interval = engine.config().flush_interval;
        loop {
            tokio::select! {
                _ = shutdown.notified() => return,
                _ = tokio::time::sleep(interval) => engine.logbus_flush_all(),
            }
        }
    });
}

/// Periodic metrics sampler feeding StreamMetrics subscribers.
fn spawn_metrics_sampler(engine: Arc<DaemonEngine>, shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        let mut sampler = MetricsSampler::new();
        loop {
            tokio::select! {
                _ = shutdown.notified() => return,
                _ = tokio::time::sleep(Duration::from_secs(2)) => {
                    if engine.metrics().subscriber_count() == 0 {
                        continue;
                    }
                    let sample = sampler.sample(clock_ms());
                    let metrics = EngineMetrics {
                        host: sample,
                        running_jobs: engine.running_count(),
                        total_jobs: engine.job_count(),
                        ledger: engine.ledger().snapshot(),
                    };
                    engine.metrics().publish(metrics);
                }
            }
        }
    });
}

fn clock_ms() -> u64 {
    use joblet_core::Clock;
    SystemClock.epoch_ms()
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "node-0".to_string())
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
