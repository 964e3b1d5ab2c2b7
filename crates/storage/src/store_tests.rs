// SPDX-License-Identifier: MIT

use super::*;
use joblet_core::{Clock, FakeClock, Job, JobId, JobSpec, JobStatus, Workflow, WorkflowId};

fn store() -> (tempfile::TempDir, StateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(StateLayout::new(dir.path())).unwrap();
    (dir, store)
}

fn job(id: &str) -> Job {
    let clock = FakeClock::new();
    Job::from_spec(
        JobId::new(id),
        1,
        JobSpec {
            command: "echo".to_string(),
            ..Default::default()
        },
        None,
        "node-a".to_string(),
        clock.utc_now(),
    )
}

#[test]
fn job_records_roundtrip() {
    let (_dir, store) = store();
    let mut j = job("j1");
    j.status = JobStatus::Completed;
    j.exit_code = Some(0);
    store.write_job(&j).unwrap();

    let loaded = store.load_jobs().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "j1");
    assert_eq!(loaded[0].status, JobStatus::Completed);
    assert_eq!(loaded[0].exit_code, Some(0));
}

#[test]
fn delete_job_removes_record_and_log() {
    let (_dir, store) = store();
    let j = job("j1");
    store.write_job(&j).unwrap();
    std::fs::create_dir_all(store.layout().logs_dir()).unwrap();
    std::fs::write(store.layout().log_path("j1"), b"line\n").unwrap();

    store.delete_job("j1").unwrap();
    assert!(store.load_jobs().unwrap().is_empty());
    assert!(!store.layout().log_path("j1").exists());

    // Deleting again is fine.
    store.delete_job("j1").unwrap();
}

#[test]
fn corrupt_records_are_skipped() {
    let (_dir, store) = store();
    store.write_job(&job("good")).unwrap();
    std::fs::write(store.layout().jobs_dir().join("bad.json"), b"{nope").unwrap();

    let loaded = store.load_jobs().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "good");
}

#[test]
fn non_json_files_are_ignored() {
    let (_dir, store) = store();
    std::fs::write(store.layout().jobs_dir().join("README"), b"hi").unwrap();
    assert!(store.load_jobs().unwrap().is_empty());
}

#[test]
fn workflow_records_roundtrip() {
    let (_dir, store) = store();
    let clock = FakeClock::new();
    let mut wf = Workflow::new(
        WorkflowId::new("wf1"),
        "deploy".to_string(),
        Some("ship it".to_string()),
        clock.utc_now(),
    );
    wf.jobs.push(JobId::new("j1"));
    store.write_workflow(&wf).unwrap();

    let loaded = store.load_workflows().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "wf1");
    assert_eq!(loaded[0].jobs, vec![JobId::new("j1")]);

    store.delete_workflow("wf1").unwrap();
    assert!(store.load_workflows().unwrap().is_empty());
}
