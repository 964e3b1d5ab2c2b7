// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joblet-core: domain types for the joblet execution engine.

pub mod clock;
pub mod event;
pub mod job;
pub mod manifest;
pub mod network;
pub mod record;
pub mod resource;
pub mod timer;
pub mod volume;
pub mod workflow;

pub use clock::{epoch_ms_to_utc, Clock, SystemClock};
pub use event::{EngineEvent, StopReason, TransitionEvent};
pub use job::{
    DependencySpec, DirUpload, Job, JobId, JobSpec, JobStatus, RequiredState, Upload, HOST_RUNTIME,
};
pub use manifest::{normalize_within_root, ManifestError, MountSpec, RuntimeManifest};
pub use network::{validate_cidr, Network, NetworkError, BRIDGE_NETWORK, HOST_NETWORK};
pub use record::{LogChannel, LogRecord};
pub use resource::{
    parse_duration, parse_size, CpuSet, Reservation, ResourceError, ResourceRequest,
};
pub use timer::TimerId;
pub use volume::{validate_name as validate_volume_name, Volume, VolumeError, VolumeKind};
pub use workflow::{Workflow, WorkflowId, WorkflowStatus};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
