// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    clean_exit = { ExitOutcome::Exited(0), 0, true },
    nonzero = { ExitOutcome::Exited(3), 3, false },
    sigterm = { ExitOutcome::Signaled(15), 143, false },
    sigkill = { ExitOutcome::Signaled(9), 137, false },
)]
fn exit_outcome_codes(outcome: ExitOutcome, code: i32, success: bool) {
    assert_eq!(outcome.exit_code(), code);
    assert_eq!(outcome.success(), success);
}

#[test]
fn empty_artifacts() {
    let artifacts = SandboxArtifacts::default();
    assert!(artifacts.is_empty());

    let with_cgroup = SandboxArtifacts {
        cgroup_dir: Some(PathBuf::from("/sys/fs/cgroup/joblet.slice/job-x")),
        ..Default::default()
    };
    assert!(!with_cgroup.is_empty());
}
