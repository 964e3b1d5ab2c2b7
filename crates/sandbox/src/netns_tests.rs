// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn ns_names_are_prefixed() {
    assert_eq!(ns_name("bridge"), "joblet-bridge");
    assert_eq!(ns_name("internal"), "joblet-internal");
}

#[test]
fn ns_paths_are_pinned_under_run() {
    assert_eq!(
        ns_path("internal"),
        PathBuf::from("/run/netns/joblet-internal")
    );
}
