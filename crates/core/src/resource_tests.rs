// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    bytes = { "512B", 512 },
    kilobytes = { "4KB", 4096 },
    megabytes = { "100MB", 100 * 1024 * 1024 },
    gigabytes = { "2GB", 2 * 1024 * 1024 * 1024 },
    terabytes = { "1TB", 1 << 40 },
    lowercase = { "16mb", 16 * 1024 * 1024 },
    padded = { "  8KB ", 8192 },
)]
fn parse_size_accepts(input: &str, expected: u64) {
    assert_eq!(parse_size(input).unwrap(), expected);
}

#[parameterized(
    no_unit = { "512" },
    no_number = { "MB" },
    unknown_unit = { "5XB" },
    negative = { "-1MB" },
    empty = { "" },
    fractional = { "1.5GB" },
)]
fn parse_size_rejects(input: &str) {
    assert!(parse_size(input).is_err());
}

#[test]
fn parse_size_overflow_is_an_error() {
    assert!(parse_size("99999999999TB").is_err());
}

#[test]
fn cpuset_parses_ranges_and_singles() {
    let set = CpuSet::parse("0-3,5").unwrap();
    assert_eq!(set.len(), 5);
    assert!(set.contains(0));
    assert!(set.contains(3));
    assert!(!set.contains(4));
    assert!(set.contains(5));
}

#[test]
fn cpuset_display_renders_compact_ranges() {
    let set = CpuSet::from_cores([0, 1, 2, 3, 5]);
    assert_eq!(set.to_string(), "0-3,5");
    let single = CpuSet::from_cores([7]);
    assert_eq!(single.to_string(), "7");
}

#[test]
fn cpuset_display_roundtrips() {
    let set = CpuSet::parse("0,2-4,9").unwrap();
    let again = CpuSet::parse(&set.to_string()).unwrap();
    assert_eq!(set, again);
}

#[parameterized(
    backwards_range = { "3-0" },
    letters = { "a-b" },
    trailing_comma_part = { "0,," },
)]
fn cpuset_rejects(input: &str) {
    assert!(CpuSet::parse(input).is_err());
}

#[test]
fn cpuset_empty_string_is_empty_set() {
    assert!(CpuSet::parse("").unwrap().is_empty());
}

#[test]
fn cpuset_subset_and_disjoint() {
    let a = CpuSet::from_cores([0, 1]);
    let b = CpuSet::from_cores([0, 1, 2]);
    let c = CpuSet::from_cores([4, 5]);
    assert!(a.is_subset(&b));
    assert!(!b.is_subset(&a));
    assert!(a.is_disjoint(&c));
    assert!(!a.is_disjoint(&b));
}

#[parameterized(
    explicit_mask_wins = { Some("0-3"), 100, 4 },
    percent_rounds_up = { None, 250, 3 },
    single_core = { None, 100, 1 },
    fraction_of_core = { None, 50, 1 },
    unlimited = { None, 0, 0 },
)]
fn cores_needed(mask: Option<&str>, percent: u32, expected: u32) {
    let request = ResourceRequest {
        max_cpu_percent: percent,
        cpu_cores: mask.map(|m| CpuSet::parse(m).unwrap()),
        ..Default::default()
    };
    assert_eq!(request.cores_needed(), expected);
}

#[test]
fn request_validate_rejects_absurd_percent() {
    let request = ResourceRequest {
        max_cpu_percent: 20_000,
        ..Default::default()
    };
    assert!(matches!(
        request.validate(),
        Err(ResourceError::InvalidCpuPercent(20_000))
    ));
}

#[test]
fn parse_duration_accepts_humantime() {
    assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
    assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert!(parse_duration("banana").is_err());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn cpuset_display_parse_roundtrip(cores in proptest::collection::btree_set(0u32..256, 0..32)) {
            let set = CpuSet::from_cores(cores.iter().copied());
            let rendered = set.to_string();
            let parsed = CpuSet::parse(&rendered).unwrap();
            prop_assert_eq!(parsed, set);
        }

        #[test]
        fn parse_size_scales_linearly(value in 0u64..1_000_000) {
            let kb = parse_size(&format!("{value}KB")).unwrap();
            prop_assert_eq!(kb, value * 1024);
            let mb = parse_size(&format!("{value}MB")).unwrap();
            prop_assert_eq!(mb, value * 1024 * 1024);
        }
    }
}
