// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joblet-sandbox: Linux isolation adapters.
//!
//! This crate owns every syscall the engine needs for sandboxing: cgroup v2
//! slices, bind-mount materialization, network namespaces, and process
//! spawning with a pidfd. The engine talks to it through two seams,
//! [`SandboxAdapter`] (build/teardown an execution environment) and
//! [`ProcessAdapter`] (launch and supervise one child), so everything above
//! this crate is testable with the fakes behind the `test-support` feature.

pub mod adapter;
pub mod cgroup;
pub mod host;
pub mod mounts;
pub mod netns;
pub mod subprocess;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub mod spawn;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use adapter::{
    BuildRequest, ExitOutcome, LaunchSpec, NetworkAttachment, ProcessAdapter, ProcessControl,
    ProcessHandle, SandboxAdapter, SandboxArtifacts, SandboxError, VolumeMount,
};
pub use host::{HostResources, MetricsSample, MetricsSampler};

#[cfg(target_os = "linux")]
pub use linux::LinuxSandbox;
#[cfg(target_os = "linux")]
pub use spawn::LinuxProcessAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessAdapter, FakeSandbox};
