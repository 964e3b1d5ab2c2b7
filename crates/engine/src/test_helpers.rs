// SPDX-License-Identifier: MIT

//! Shared harness for engine tests: a wired engine on fakes plus a
//! running scheduler loop.

use std::sync::Arc;
use std::time::Duration;

use joblet_core::{Job, JobId, JobSpec, SystemClock};
use joblet_sandbox::{FakeProcessAdapter, FakeSandbox, HostResources};
use joblet_storage::{StateLayout, StateStore};

use crate::engine::{Engine, EngineConfig};
use crate::scheduler::Scheduler;

pub(crate) type TestEngine = Engine<FakeSandbox, FakeProcessAdapter, SystemClock>;

pub(crate) struct Harness {
    pub engine: Arc<TestEngine>,
    // Held for the lifetime of the test; the state dir lives here.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
}

pub(crate) fn config() -> EngineConfig {
    EngineConfig {
        node_id: "test-node".to_string(),
        workers: 2,
        grace: Duration::from_millis(200),
        retention_terminal: 1024,
        ring_capacity: 64,
        flush_interval: Duration::from_millis(50),
        retry_gap: Duration::from_millis(20),
    }
}

/// Engine + running scheduler loop on fake adapters.
pub(crate) fn harness() -> Harness {
    harness_with(config(), FakeSandbox::new(), FakeProcessAdapter::new())
}

pub(crate) fn harness_with(
    config: EngineConfig,
    sandbox: FakeSandbox,
    processes: FakeProcessAdapter,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let storage = StateStore::new(StateLayout::new(dir.path())).unwrap();
    let host = HostResources::fixed(8 * 1024 * 1024 * 1024, 4, 2);
    let (engine, event_rx) =
        Engine::new(config, SystemClock, sandbox, processes, host, storage).unwrap();
    tokio::spawn(Scheduler::new(Arc::clone(&engine), event_rx).run());
    Harness { engine, dir }
}

pub(crate) fn spec(command: &str, args: &[&str]) -> JobSpec {
    JobSpec {
        command: command.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        ..Default::default()
    }
}

/// Poll until the job reaches a terminal state (5 s budget).
pub(crate) async fn wait_terminal(engine: &TestEngine, id: &JobId) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(job) = engine_job(engine, id) {
            if job.is_terminal() {
                return job;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("job {id} did not reach a terminal state in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn engine_job(engine: &TestEngine, id: &JobId) -> Option<Job> {
    engine.get_job(id).ok()
}
