// SPDX-License-Identifier: MIT

use super::*;
use crate::test_helpers::{harness, wait_terminal, TestEngine};
use joblet_core::WorkflowStatus;

/// The derived status is recomputed by the scheduler loop after child
/// terminals commit, so observers poll for it.
async fn wait_workflow_status(engine: &TestEngine, id: &WorkflowId, expected: WorkflowStatus) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let (workflow, _) = engine.get_workflow(id).unwrap();
        if workflow.status == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "workflow stuck in {}, wanted {expected}",
            workflow.status
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn workflow_children_submit_in_topo_order() {
    let h = harness();
    let yaml = r#"
version: "1.0"
name: chain
jobs:
  b:
    command: [echo, b]
    dependsOn: [a]
  a:
    command: [sleep, "1"]
"#;
    let (workflow_id, job_ids) = h.engine.submit_workflow(yaml, false).unwrap();
    assert_eq!(job_ids.len(), 2);

    // Fetching returns children in topological submission order.
    let (workflow, children) = h.engine.get_workflow(&workflow_id).unwrap();
    assert_eq!(workflow.jobs, job_ids);
    assert_eq!(children.len(), 2);
    // First child is "a" (no dependencies).
    assert!(children[0].depends_on.is_empty());
    assert_eq!(children[1].depends_on[0].job_id, children[0].id);

    let a = wait_terminal(&h.engine, &job_ids[0]).await;
    let b = wait_terminal(&h.engine, &job_ids[1]).await;
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);
    assert!(b.started_at.unwrap() >= a.ended_at.unwrap());

    wait_workflow_status(&h.engine, &workflow_id, WorkflowStatus::Completed).await;
}

#[tokio::test]
async fn dependency_failure_stops_downstream() {
    let h = harness();
    let yaml = r#"
version: "1.0"
name: failing
jobs:
  a:
    command: ["false"]
  b:
    command: [echo, b]
    dependsOn: ["a:COMPLETED"]
"#;
    let (workflow_id, job_ids) = h.engine.submit_workflow(yaml, false).unwrap();
    let a = wait_terminal(&h.engine, &job_ids[0]).await;
    let b = wait_terminal(&h.engine, &job_ids[1]).await;

    assert_eq!(a.status, JobStatus::Failed);
    assert_eq!(b.status, JobStatus::Stopped);
    assert_eq!(b.stop_reason, Some(StopReason::DependencyUnsatisfied));

    wait_workflow_status(&h.engine, &workflow_id, WorkflowStatus::Failed).await;
}

#[tokio::test]
async fn cycle_is_rejected_without_creating_jobs() {
    let h = harness();
    let yaml = r#"
version: "1.0"
name: cyclic
jobs:
  a:
    command: [echo]
    dependsOn: [b]
  b:
    command: [echo]
    dependsOn: [a]
"#;
    let err = h.engine.submit_workflow(yaml, false).unwrap_err();
    assert!(matches!(err, EngineError::CycleDetected(ref steps) if steps == &vec!["a".to_string(), "b".to_string()]));
    assert!(h.engine.store.is_empty());
    assert!(h.engine.list_workflows().is_empty());
}

#[tokio::test]
async fn parse_error_creates_nothing() {
    let h = harness();
    assert!(matches!(
        h.engine.submit_workflow("version: \"9.9\"\nname: x\njobs: {}", false),
        Err(EngineError::ParseError(_))
    ));
    assert!(h.engine.store.is_empty());
}

#[tokio::test]
async fn missing_volumes_surface_or_autocreate() {
    let h = harness();
    let yaml = r#"
version: "1.0"
name: vols
jobs:
  a:
    command: [echo]
    volumes: [models, cache]
"#;
    match h.engine.submit_workflow(yaml, false) {
        Err(EngineError::MissingVolumes(missing)) => {
            assert_eq!(missing, vec!["models", "cache"]);
        }
        other => panic!("expected MissingVolumes, got {other:?}"),
    }
    assert!(h.engine.list_workflows().is_empty());

    let (_, job_ids) = h.engine.submit_workflow(yaml, true).unwrap();
    assert_eq!(h.engine.list_volumes().len(), 2);
    wait_terminal(&h.engine, &job_ids[0]).await;
}

#[tokio::test]
async fn step_uploads_are_staged_onto_children() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("input.csv"), b"a,b\n").unwrap();
    let config_dir = dir.path().join("config");
    std::fs::create_dir_all(config_dir.join("nested")).unwrap();
    std::fs::write(config_dir.join("app.toml"), b"x = 1").unwrap();
    std::fs::write(config_dir.join("nested/extra.toml"), b"y = 2").unwrap();

    let yaml = format!(
        r#"
version: "1.0"
name: uploaded
jobs:
  a:
    command: [echo, go]
    uploads:
      files: ["{input}"]
      directories: ["{config}"]
"#,
        input = dir.path().join("input.csv").display(),
        config = config_dir.display(),
    );
    let (_, job_ids) = h.engine.submit_workflow(&yaml, false).unwrap();

    // Contents were read at submission and ride on the child job.
    let child = h.engine.get_job(&job_ids[0]).unwrap();
    assert_eq!(child.uploads.len(), 1);
    assert_eq!(child.uploads[0].name, "input.csv");
    assert_eq!(child.uploads[0].content, b"a,b\n");
    assert_eq!(child.upload_dirs.len(), 1);
    assert_eq!(child.upload_dirs[0].name, "config");
    let mut names: Vec<&str> = child.upload_dirs[0]
        .files
        .iter()
        .map(|file| file.name.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["app.toml", "nested/extra.toml"]);

    wait_terminal(&h.engine, &job_ids[0]).await;
}

#[tokio::test]
async fn unreadable_step_upload_rejects_the_workflow() {
    let h = harness();
    let yaml = r#"
version: "1.0"
name: ghostly
jobs:
  a:
    command: [echo]
    uploads:
      files: ["/nonexistent/ghost.bin"]
"#;
    assert!(matches!(
        h.engine.submit_workflow(yaml, false),
        Err(EngineError::InvalidRequest(_))
    ));
    // Nothing was created.
    assert!(h.engine.store.is_empty());
    assert!(h.engine.list_workflows().is_empty());
}

#[tokio::test]
async fn failed_step_retries_as_fresh_job() {
    let h = harness();
    let yaml = r#"
version: "1.0"
name: retrying
jobs:
  flaky:
    command: [fail, "2"]
    retries: 2
"#;
    let (workflow_id, job_ids) = h.engine.submit_workflow(yaml, false).unwrap();
    assert_eq!(job_ids.len(), 1);
    wait_terminal(&h.engine, &job_ids[0]).await;

    // All attempts run and fail; each is a distinct job, all visible.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let (workflow, children) = h.engine.get_workflow(&workflow_id).unwrap();
        if workflow.jobs.len() == 3 && children.iter().all(|c| c.is_terminal()) {
            let ids: std::collections::HashSet<_> =
                workflow.jobs.iter().map(|id| id.as_str().to_string()).collect();
            assert_eq!(ids.len(), 3, "attempts must have distinct ids");
            assert!(children.iter().all(|c| c.status == JobStatus::Failed));
            assert_eq!(workflow.status, WorkflowStatus::Failed);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "retries never drained"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn timeout_stops_a_running_step() {
    let h = harness();
    // sleep 600 at 10ms scale is a 6 s run; the 100ms timeout cuts it.
    let yaml = r#"
version: "1.0"
name: timed
jobs:
  slow:
    command: [sleep, "600"]
    timeout: 100ms
"#;
    let (_, job_ids) = h.engine.submit_workflow(yaml, false).unwrap();
    let done = wait_terminal(&h.engine, &job_ids[0]).await;
    assert_eq!(done.status, JobStatus::Stopped);
    assert_eq!(done.stop_reason, Some(StopReason::Timeout));
}

#[tokio::test]
async fn workflow_cancellation_stops_everything() {
    let h = harness();
    let yaml = r#"
version: "1.0"
name: cancellable
jobs:
  first:
    command: [sleep, "600"]
  second:
    command: [echo, never]
    dependsOn: [first]
"#;
    let (workflow_id, job_ids) = h.engine.submit_workflow(yaml, false).unwrap();

    // Wait for the first step to be running.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if h.engine.get_job(&job_ids[0]).unwrap().status == JobStatus::Running {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    h.engine.cancel_workflow(&workflow_id).unwrap();
    let first = wait_terminal(&h.engine, &job_ids[0]).await;
    let second = wait_terminal(&h.engine, &job_ids[1]).await;

    assert_eq!(first.status, JobStatus::Stopped);
    assert_eq!(second.status, JobStatus::Stopped);
    assert_eq!(second.stop_reason, Some(StopReason::WorkflowCancelled));

    wait_workflow_status(&h.engine, &workflow_id, WorkflowStatus::Stopped).await;
}
