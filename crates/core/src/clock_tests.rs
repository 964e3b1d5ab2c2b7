// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn fake_clock_advances_monotonic_and_epoch() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    let e0 = clock.epoch_ms();

    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.now() - t0, Duration::from_secs(5));
    assert_eq!(clock.epoch_ms() - e0, 5000);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_millis(250));
    assert_eq!(other.epoch_ms(), clock.epoch_ms());
}

#[test]
fn system_clock_epoch_is_sane() {
    let clock = SystemClock;
    // After 2023-01-01 in milliseconds.
    assert!(clock.epoch_ms() > 1_672_531_200_000);
}

#[test]
fn utc_conversion_roundtrips() {
    let dt = epoch_ms_to_utc(1_700_000_000_000);
    assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
}
