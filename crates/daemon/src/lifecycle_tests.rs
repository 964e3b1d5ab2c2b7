// SPDX-License-Identifier: MIT

use super::*;
use crate::env::DaemonConfig;

fn config(dir: &std::path::Path) -> DaemonConfig {
    DaemonConfig::from_lookup(|key| match key {
        "JOBLET_STATE_DIR" => Some(dir.display().to_string()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
async fn startup_acquires_lock_and_binds_socket() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (daemon, _listener) = startup(&config).await.unwrap();

    assert!(config.socket_path().exists());
    let pid: u32 = std::fs::read_to_string(config.lock_path())
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());
    assert_eq!(daemon.engine.job_count(), 0);
}

#[tokio::test]
async fn second_daemon_is_locked_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let (_daemon, _listener) = startup(&config).await.unwrap();

    match startup(&config).await {
        Err(LifecycleError::LockFailed(_)) => {}
        other => panic!("expected LockFailed, got {:?}", other.is_ok()),
    }
}

#[tokio::test]
async fn workers_override_applies() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.workers = Some(3);
    let (daemon, _listener) = startup(&config).await.unwrap();
    assert_eq!(daemon.engine.config().workers, 3);
}
