// SPDX-License-Identifier: MIT

use super::*;
use joblet_core::{Clock, FakeClock, JobSpec};

fn job(id: &str, seq: u64) -> Job {
    let clock = FakeClock::new();
    Job::from_spec(
        JobId::new(id),
        seq,
        JobSpec {
            command: "echo".to_string(),
            ..Default::default()
        },
        None,
        "node".to_string(),
        clock.utc_now(),
    )
}

#[test]
fn insert_get_remove() {
    let store = JobStore::new();
    store.insert(job("a", 1));
    assert!(store.contains(&JobId::new("a")));
    assert_eq!(store.get(&JobId::new("a")).unwrap().seq, 1);
    store.remove(&JobId::new("a"));
    assert!(store.get(&JobId::new("a")).is_none());
}

#[test]
fn all_is_ordered_by_submission_seq() {
    let store = JobStore::new();
    for (id, seq) in [("c", 3), ("a", 1), ("b", 2)] {
        store.insert(job(id, seq));
    }
    let order: Vec<u64> = store.all().iter().map(|j| j.seq).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn transition_applies_attrs() {
    let store = JobStore::new();
    let clock = FakeClock::new();
    store.insert(job("a", 1));
    let id = JobId::new("a");

    store
        .transition(&id, JobStatus::Queued, JobStatus::Scheduled, TransitionAttrs::default())
        .unwrap();
    store
        .transition(
            &id,
            JobStatus::Scheduled,
            JobStatus::Initializing,
            TransitionAttrs::default(),
        )
        .unwrap();
    let running = store
        .transition(
            &id,
            JobStatus::Initializing,
            JobStatus::Running,
            TransitionAttrs {
                started_at: Some(clock.utc_now()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(running.started_at.is_some());

    let done = store
        .transition(
            &id,
            JobStatus::Running,
            JobStatus::Completed,
            TransitionAttrs {
                ended_at: Some(clock.utc_now()),
                exit_code: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(done.exit_code, Some(0));
    assert!(done.ended_at.unwrap() >= done.started_at.unwrap());
}

#[test]
fn optimistic_check_rejects_stale_from() {
    let store = JobStore::new();
    store.insert(job("a", 1));
    let id = JobId::new("a");
    store
        .transition(&id, JobStatus::Queued, JobStatus::Stopped, TransitionAttrs::default())
        .unwrap();

    let err = store
        .transition(&id, JobStatus::Queued, JobStatus::Scheduled, TransitionAttrs::default())
        .unwrap_err();
    assert!(matches!(err, TransitionError::Conflict { .. }));
}

#[test]
fn forbidden_edges_are_rejected() {
    let store = JobStore::new();
    store.insert(job("a", 1));
    let err = store
        .transition(
            &JobId::new("a"),
            JobStatus::Queued,
            JobStatus::Running,
            TransitionAttrs::default(),
        )
        .unwrap_err();
    assert!(matches!(err, TransitionError::Forbidden { .. }));
}

#[test]
fn missing_job_is_not_found() {
    let store = JobStore::new();
    assert!(matches!(
        store.transition(
            &JobId::new("ghost"),
            JobStatus::Queued,
            JobStatus::Stopped,
            TransitionAttrs::default(),
        ),
        Err(TransitionError::NotFound(_))
    ));
}

#[tokio::test]
async fn observers_are_notified_after_commit() {
    let store = JobStore::new();
    store.insert(job("a", 1));
    let mut watch = store.watch_transitions();

    store
        .transition(
            &JobId::new("a"),
            JobStatus::Queued,
            JobStatus::Stopped,
            TransitionAttrs::default(),
        )
        .unwrap();

    let event = watch.recv().await.unwrap();
    assert_eq!(event.from, JobStatus::Queued);
    assert_eq!(event.to, JobStatus::Stopped);
    // The store already reflects the commit the observer heard about.
    assert_eq!(
        store.get(&JobId::new("a")).unwrap().status,
        JobStatus::Stopped
    );
}
