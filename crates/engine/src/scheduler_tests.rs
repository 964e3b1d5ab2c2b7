// SPDX-License-Identifier: MIT

use crate::test_helpers::{config, harness, harness_with, spec, wait_terminal};
use joblet_core::{JobStatus, ResourceRequest, StopReason};
use joblet_sandbox::{FakeProcessAdapter, FakeSandbox};

#[tokio::test]
async fn worker_cap_bounds_running_jobs() {
    let mut cfg = config();
    cfg.workers = 2;
    let h = harness_with(cfg, FakeSandbox::new(), FakeProcessAdapter::new());

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(
            h.engine
                .submit_job(spec("sleep", &["5"]), Vec::new())
                .unwrap()
                .id,
        );
    }

    // Observe the cap while the batch drains.
    let mut max_running = 0;
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let running = h.engine.running_count();
        max_running = max_running.max(running);
        assert!(running <= 2, "worker cap violated: {running}");
        let all_done = ids
            .iter()
            .all(|id| h.engine.get_job(id).map(|j| j.is_terminal()).unwrap_or(true));
        if all_done {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "batch never drained");
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    assert!(max_running > 0);

    for id in &ids {
        assert_eq!(
            h.engine.get_job(id).unwrap().status,
            JobStatus::Completed
        );
    }
}

#[tokio::test]
async fn memory_exhaustion_keeps_jobs_queued_until_release() {
    // Host has 8 GiB; each job wants 5 GiB, so only one runs at a time
    // even though two worker slots exist.
    let h = harness();
    let request = ResourceRequest {
        max_memory_bytes: 5 * 1024 * 1024 * 1024,
        ..Default::default()
    };
    let mut ids = Vec::new();
    for _ in 0..3 {
        let mut s = spec("sleep", &["3"]);
        s.resources = request.clone();
        ids.push(h.engine.submit_job(s, Vec::new()).unwrap().id);
    }

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let jobs: Vec<_> = ids.iter().map(|id| h.engine.get_job(id).unwrap()).collect();
        let running = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();
        assert!(running <= 1, "memory gate violated");
        if jobs.iter().all(|j| j.is_terminal()) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "jobs never drained: {:?}",
            jobs.iter().map(|j| j.status).collect::<Vec<_>>()
        );
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    for id in &ids {
        assert_eq!(h.engine.get_job(id).unwrap().status, JobStatus::Completed);
    }
}

#[tokio::test]
async fn admission_is_fifo_among_equals() {
    let mut cfg = config();
    cfg.workers = 1;
    let h = harness_with(cfg, FakeSandbox::new(), FakeProcessAdapter::new());

    let first = h
        .engine
        .submit_job(spec("echo", &["first"]), Vec::new())
        .unwrap();
    let second = h
        .engine
        .submit_job(spec("echo", &["second"]), Vec::new())
        .unwrap();

    let first_done = wait_terminal(&h.engine, &first.id).await;
    let second_done = wait_terminal(&h.engine, &second.id).await;
    assert!(first_done.started_at.unwrap() <= second_done.started_at.unwrap());
}

#[tokio::test]
async fn past_schedule_time_runs_immediately() {
    let h = harness();
    let mut s = spec("echo", &["late"]);
    s.schedule_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
    let job = h.engine.submit_job(s, Vec::new()).unwrap();
    let done = wait_terminal(&h.engine, &job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
async fn future_schedule_parks_then_runs() {
    let h = harness();
    let mut s = spec("echo", &["timed"]);
    s.schedule_at = Some(chrono::Utc::now() + chrono::Duration::milliseconds(150));
    let job = h.engine.submit_job(s, Vec::new()).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let parked = h.engine.get_job(&job.id).unwrap();
    assert_eq!(parked.status, JobStatus::Scheduled);
    // Parked jobs hold no reservation and no worker slot.
    assert!(h.engine.ledger().snapshot().reservations.is_empty());
    assert_eq!(h.engine.running_count(), 0);

    let done = wait_terminal(&h.engine, &job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
async fn far_future_schedule_is_cancellable() {
    let h = harness();
    let mut s = spec("echo", &["someday"]);
    s.schedule_at = Some(chrono::Utc::now() + chrono::Duration::days(365));
    let job = h.engine.submit_job(s, Vec::new()).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.engine.get_job(&job.id).unwrap().status, JobStatus::Scheduled);

    h.engine.stop_job(&job.id).unwrap();
    let done = wait_terminal(&h.engine, &job.id).await;
    assert_eq!(done.status, JobStatus::Stopped);
    assert_eq!(done.stop_reason, Some(StopReason::UserRequested));
}

#[tokio::test]
async fn stop_of_queued_job_never_runs() {
    let mut cfg = config();
    cfg.workers = 1;
    let h = harness_with(cfg, FakeSandbox::new(), FakeProcessAdapter::new());

    // Occupy the only slot, then queue a victim and stop it.
    let blocker = h
        .engine
        .submit_job(spec("sleep", &["200"]), Vec::new())
        .unwrap();
    let victim = h.engine.submit_job(spec("echo", &["x"]), Vec::new()).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    h.engine.stop_job(&victim.id).unwrap();
    let stopped = wait_terminal(&h.engine, &victim.id).await;
    assert_eq!(stopped.status, JobStatus::Stopped);
    assert!(stopped.started_at.is_none());

    h.engine.stop_job(&blocker.id).unwrap();
    wait_terminal(&h.engine, &blocker.id).await;
}

#[tokio::test]
async fn dependent_starts_after_dependency_ends() {
    let h = harness();
    let first = h
        .engine
        .submit_job(spec("sleep", &["10"]), Vec::new())
        .unwrap();
    let mut s = spec("echo", &["b"]);
    s.depends_on.push(joblet_core::DependencySpec {
        job_id: first.id.clone(),
        required: Default::default(),
    });
    let second = h.engine.submit_job(s, Vec::new()).unwrap();

    let first_done = wait_terminal(&h.engine, &first.id).await;
    let second_done = wait_terminal(&h.engine, &second.id).await;
    assert_eq!(second_done.status, JobStatus::Completed);
    assert!(second_done.started_at.unwrap() >= first_done.ended_at.unwrap());
}

#[tokio::test]
async fn failed_dependency_stops_dependent() {
    let h = harness();
    let dep = h.engine.submit_job(spec("false", &[]), Vec::new()).unwrap();
    let mut s = spec("echo", &["b"]);
    s.depends_on.push(joblet_core::DependencySpec {
        job_id: dep.id.clone(),
        required: joblet_core::RequiredState::Completed,
    });
    let dependent = h.engine.submit_job(s, Vec::new()).unwrap();

    let dep_done = wait_terminal(&h.engine, &dep.id).await;
    assert_eq!(dep_done.status, JobStatus::Failed);

    let stopped = wait_terminal(&h.engine, &dependent.id).await;
    assert_eq!(stopped.status, JobStatus::Stopped);
    assert_eq!(stopped.stop_reason, Some(StopReason::DependencyUnsatisfied));
}

#[tokio::test]
async fn already_contradicted_dependency_stops_at_submission() {
    let h = harness();
    let dep = h.engine.submit_job(spec("false", &[]), Vec::new()).unwrap();
    let failed = wait_terminal(&h.engine, &dep.id).await;
    assert_eq!(failed.status, JobStatus::Failed);

    // The dependency is already terminal; the new job must not wait.
    let mut s = spec("echo", &["never"]);
    s.depends_on.push(joblet_core::DependencySpec {
        job_id: dep.id.clone(),
        required: joblet_core::RequiredState::Completed,
    });
    let dependent = h.engine.submit_job(s, Vec::new()).unwrap();
    let stopped = wait_terminal(&h.engine, &dependent.id).await;
    assert_eq!(stopped.status, JobStatus::Stopped);
    assert_eq!(stopped.stop_reason, Some(StopReason::DependencyUnsatisfied));
}

#[tokio::test]
async fn on_failed_condition_runs_after_failure() {
    let h = harness();
    let dep = h.engine.submit_job(spec("false", &[]), Vec::new()).unwrap();
    let mut s = spec("echo", &["cleanup"]);
    s.depends_on.push(joblet_core::DependencySpec {
        job_id: dep.id.clone(),
        required: joblet_core::RequiredState::Failed,
    });
    let dependent = h.engine.submit_job(s, Vec::new()).unwrap();

    let done = wait_terminal(&h.engine, &dependent.id).await;
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
async fn stop_stop_is_idempotent() {
    let h = harness();
    let job = h
        .engine
        .submit_job(spec("sleep", &["600"]), Vec::new())
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    h.engine.stop_job(&job.id).unwrap();
    // Second stop while the first is in flight: either accepted (still
    // non-terminal) or AlreadyTerminal; never an inconsistent state.
    let _ = h.engine.stop_job(&job.id);
    let done = wait_terminal(&h.engine, &job.id).await;
    assert_eq!(done.status, JobStatus::Stopped);
}
