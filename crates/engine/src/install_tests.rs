// SPDX-License-Identifier: MIT

use super::*;
use crate::test_helpers::{harness, wait_terminal};
use crate::EngineError;

fn write_manifest(dir: &std::path::Path, name: &str) {
    let yaml = format!(
        "name: {name}\nversion: \"1.0\"\nmounts:\n  - source: usr\n    target: /usr\n    readonly: true\nenvironment:\n  LANG: C\n"
    );
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("runtime.yml"), yaml).unwrap();
}

#[tokio::test]
async fn install_registers_manifest_on_completion() {
    let h = harness();
    // Stage the built tree the way the build script would have; the fake
    // meta-job exits instantly, so the tree must be there first.
    write_manifest(
        &h.engine.storage.layout().runtime_dir("python-3.11-ml"),
        "python-3.11-ml",
    );
    let job_id = h
        .engine
        .install_runtime("python-3.11-ml", "/tmp/runtime-src")
        .unwrap();

    let done = wait_terminal(&h.engine, &job_id).await;
    assert_eq!(done.status, JobStatus::Completed);

    // Registration happens on the terminal event; give the loop a beat.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while !h.engine.registry().contains("python-3.11-ml") {
        assert!(tokio::time::Instant::now() < deadline, "never registered");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    let manifest = h.engine.registry().lookup("python-3.11-ml").unwrap();
    assert_eq!(manifest.mounts.len(), 1);
}

#[tokio::test]
async fn install_duplicate_name_is_rejected() {
    let h = harness();
    h.engine
        .registry()
        .register(RuntimeManifest {
            name: "py".to_string(),
            version: "1".to_string(),
            description: None,
            mounts: Vec::new(),
            environment: Default::default(),
        })
        .unwrap();
    assert!(matches!(
        h.engine.install_runtime("py", "/tmp/src"),
        Err(EngineError::DuplicateName(_))
    ));
}

#[tokio::test]
async fn install_without_manifest_does_not_register() {
    let h = harness();
    let job_id = h.engine.install_runtime("empty", "/tmp/src").unwrap();
    wait_terminal(&h.engine, &job_id).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!h.engine.registry().contains("empty"));
}

#[tokio::test]
async fn remove_runtime_refuses_while_referenced() {
    let h = harness();
    h.engine
        .registry()
        .register(RuntimeManifest {
            name: "py".to_string(),
            version: "1".to_string(),
            description: None,
            mounts: Vec::new(),
            environment: Default::default(),
        })
        .unwrap();

    let mut s = crate::test_helpers::spec("sleep", &["600"]);
    s.runtime = Some("py".to_string());
    let job = h.engine.submit_job(s, Vec::new()).unwrap();
    assert!(matches!(
        h.engine.remove_runtime("py"),
        Err(EngineError::InUse(_))
    ));

    h.engine.stop_job(&job.id).unwrap();
    wait_terminal(&h.engine, &job.id).await;
    h.engine.remove_runtime("py").unwrap();
    assert!(!h.engine.registry().contains("py"));
}
