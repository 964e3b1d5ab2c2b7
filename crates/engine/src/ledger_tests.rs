// SPDX-License-Identifier: MIT

use super::*;
use joblet_core::ResourceRequest;

const GIB: u64 = 1024 * 1024 * 1024;

fn ledger() -> ResourceLedger {
    ResourceLedger::new(HostResources::fixed(8 * GIB, 4, 2))
}

fn request(memory: u64, cpu_percent: u32, gpus: u32) -> ResourceRequest {
    ResourceRequest {
        max_cpu_percent: cpu_percent,
        max_memory_bytes: memory,
        gpu_count: gpus,
        ..Default::default()
    }
}

#[test]
fn reserve_release_restores_identity() {
    let ledger = ledger();
    let before = ledger.snapshot();

    let id = JobId::new("j1");
    ledger.reserve(&id, &request(2 * GIB, 200, 1)).unwrap();
    ledger.release(&id);

    let after = ledger.snapshot();
    assert_eq!(before.free_memory_bytes, after.free_memory_bytes);
    assert_eq!(before.free_cores, after.free_cores);
    assert_eq!(before.free_gpus, after.free_gpus);
    assert!(after.reservations.is_empty());
}

#[test]
fn release_is_idempotent() {
    let ledger = ledger();
    let id = JobId::new("j1");
    ledger.reserve(&id, &request(GIB, 100, 0)).unwrap();
    ledger.release(&id);
    ledger.release(&id);
    assert_eq!(ledger.snapshot().free_memory_bytes, 8 * GIB);
}

#[test]
fn lowest_numbered_free_cores_are_chosen() {
    let ledger = ledger();
    let first = ledger.reserve(&JobId::new("a"), &request(0, 200, 0)).unwrap();
    assert_eq!(first.cores.to_string(), "0-1");

    let second = ledger.reserve(&JobId::new("b"), &request(0, 100, 0)).unwrap();
    assert_eq!(second.cores.to_string(), "2");

    // Releasing the first frees the low cores again.
    ledger.release(&JobId::new("a"));
    let third = ledger.reserve(&JobId::new("c"), &request(0, 100, 0)).unwrap();
    assert_eq!(third.cores.to_string(), "0");
}

#[test]
fn explicit_mask_must_match_exactly() {
    let ledger = ledger();
    let mask = ResourceRequest {
        cpu_cores: Some(joblet_core::CpuSet::parse("1-2").unwrap()),
        ..Default::default()
    };
    let got = ledger.reserve(&JobId::new("a"), &mask).unwrap();
    assert_eq!(got.cores.to_string(), "1-2");

    // Overlapping mask fails even though other cores are free.
    let overlap = ResourceRequest {
        cpu_cores: Some(joblet_core::CpuSet::parse("2-3").unwrap()),
        ..Default::default()
    };
    assert!(matches!(
        ledger.reserve(&JobId::new("b"), &overlap),
        Err(LedgerError::MaskUnavailable { .. })
    ));

    // Mask naming cores the host does not have fails outright.
    let unknown = ResourceRequest {
        cpu_cores: Some(joblet_core::CpuSet::parse("30-31").unwrap()),
        ..Default::default()
    };
    assert!(matches!(
        ledger.reserve(&JobId::new("c"), &unknown),
        Err(LedgerError::MaskUnknown { .. })
    ));
}

#[test]
fn gpus_are_first_fit_and_disjoint() {
    let ledger = ledger();
    let a = ledger.reserve(&JobId::new("a"), &request(0, 0, 1)).unwrap();
    assert_eq!(a.gpu_indices.iter().copied().collect::<Vec<_>>(), vec![0]);

    let b = ledger.reserve(&JobId::new("b"), &request(0, 0, 1)).unwrap();
    assert_eq!(b.gpu_indices.iter().copied().collect::<Vec<_>>(), vec![1]);

    assert!(matches!(
        ledger.reserve(&JobId::new("c"), &request(0, 0, 1)),
        Err(LedgerError::Gpus { .. })
    ));

    ledger.release(&JobId::new("a"));
    let c = ledger.reserve(&JobId::new("c"), &request(0, 0, 1)).unwrap();
    assert_eq!(c.gpu_indices.iter().copied().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn memory_overcommit_is_refused_atomically() {
    let ledger = ledger();
    ledger
        .reserve(&JobId::new("a"), &request(6 * GIB, 0, 0))
        .unwrap();
    // This request could satisfy cores but not memory; nothing must be
    // taken.
    let before = ledger.snapshot();
    assert!(matches!(
        ledger.reserve(&JobId::new("b"), &request(4 * GIB, 100, 1)),
        Err(LedgerError::Memory { .. })
    ));
    let after = ledger.snapshot();
    assert_eq!(before.free_cores, after.free_cores);
    assert_eq!(before.free_gpus, after.free_gpus);
}

#[test]
fn core_exhaustion_is_refused() {
    let ledger = ledger();
    ledger.reserve(&JobId::new("a"), &request(0, 400, 0)).unwrap();
    assert!(matches!(
        ledger.reserve(&JobId::new("b"), &request(0, 100, 0)),
        Err(LedgerError::Cores { .. })
    ));
}

#[test]
fn snapshot_sums_respect_totals() {
    let ledger = ledger();
    ledger.reserve(&JobId::new("a"), &request(GIB, 100, 1)).unwrap();
    ledger.reserve(&JobId::new("b"), &request(2 * GIB, 200, 1)).unwrap();

    let snapshot = ledger.snapshot();
    let reserved_memory: u64 = snapshot.reservations.iter().map(|r| r.memory_bytes).sum();
    assert!(reserved_memory <= snapshot.total_memory_bytes);
    assert_eq!(snapshot.free_memory_bytes, 8 * GIB - 3 * GIB);
    assert_eq!(snapshot.free_cores, 1);
    assert_eq!(snapshot.free_gpus, 0);

    // GPU indices are pairwise disjoint across reservations.
    let mut seen = std::collections::BTreeSet::new();
    for reservation in &snapshot.reservations {
        for gpu in &reservation.gpu_indices {
            assert!(seen.insert(*gpu), "gpu {gpu} reserved twice");
        }
    }
}

#[test]
fn zero_request_reserves_nothing_but_registers() {
    let ledger = ledger();
    let reservation = ledger
        .reserve(&JobId::new("a"), &ResourceRequest::default())
        .unwrap();
    assert!(reservation.cores.is_empty());
    assert_eq!(reservation.memory_bytes, 0);
    assert_eq!(ledger.snapshot().reservations.len(), 1);
}
