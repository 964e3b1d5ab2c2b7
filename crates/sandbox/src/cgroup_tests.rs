// SPDX-License-Identifier: MIT

use super::*;
use joblet_core::{CpuSet, JobId};

fn reservation(cores: &[u32]) -> Reservation {
    Reservation {
        job_id: JobId::new("j1"),
        cores: CpuSet::from_cores(cores.iter().copied()),
        memory_bytes: 0,
        gpu_indices: Default::default(),
    }
}

fn limits_map(files: Vec<(String, String)>) -> std::collections::HashMap<String, String> {
    files.into_iter().collect()
}

#[test]
fn unlimited_request_renders_only_weight() {
    let files = render_limits(&ResourceRequest::default(), &reservation(&[]), None);
    let map = limits_map(files);
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("cpu.weight").map(String::as_str), Some("100"));
}

#[test]
fn cpu_percent_becomes_quota() {
    let request = ResourceRequest {
        max_cpu_percent: 250,
        ..Default::default()
    };
    let map = limits_map(render_limits(&request, &reservation(&[]), None));
    assert_eq!(map.get("cpu.max").map(String::as_str), Some("250000 100000"));
}

#[test]
fn reserved_cores_become_cpuset() {
    let map = limits_map(render_limits(
        &ResourceRequest::default(),
        &reservation(&[0, 1, 2, 5]),
        None,
    ));
    assert_eq!(map.get("cpuset.cpus").map(String::as_str), Some("0-2,5"));
}

#[test]
fn memory_max_is_bytes() {
    let request = ResourceRequest {
        max_memory_bytes: 512 * 1024 * 1024,
        ..Default::default()
    };
    let map = limits_map(render_limits(&request, &reservation(&[]), None));
    assert_eq!(map.get("memory.max").map(String::as_str), Some("536870912"));
}

#[test]
fn io_max_requires_a_device() {
    let request = ResourceRequest {
        max_io_bps: 1_000_000,
        ..Default::default()
    };
    let without = limits_map(render_limits(&request, &reservation(&[]), None));
    assert!(!without.contains_key("io.max"));

    let with = limits_map(render_limits(&request, &reservation(&[]), Some((259, 2))));
    assert_eq!(
        with.get("io.max").map(String::as_str),
        Some("259:2 rbps=1000000 wbps=1000000")
    );
}

#[test]
fn leaf_names_are_job_scoped() {
    assert_eq!(leaf_name("abc-123"), "job-abc-123");
}

#[test]
fn slice_create_writes_limit_files() {
    // A plain tempdir stands in for the cgroup fs; the write path is
    // identical.
    let root = tempfile::tempdir().unwrap();
    let limits = vec![("memory.max".to_string(), "1048576".to_string())];
    let slice = CgroupSlice::create(root.path(), "j1", &limits).unwrap();
    let contents =
        std::fs::read_to_string(root.path().join(ENGINE_SLICE).join("job-j1/memory.max")).unwrap();
    assert_eq!(contents, "1048576");

    slice.add_process(4242).unwrap();
    let procs =
        std::fs::read_to_string(root.path().join(ENGINE_SLICE).join("job-j1/cgroup.procs"))
            .unwrap();
    assert_eq!(procs, "4242");
}
