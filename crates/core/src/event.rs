// SPDX-License-Identifier: MIT

//! Engine wake events and transition notifications.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::{JobId, JobStatus};
use crate::timer::TimerId;
use crate::workflow::WorkflowId;

/// Why a job was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Client called StopJob or cancelled from QUEUED/SCHEDULED.
    UserRequested,
    /// A dependency ended in a terminal state contradicting its requirement.
    DependencyUnsatisfied,
    /// The owning workflow was cancelled.
    WorkflowCancelled,
    /// Wall-time since RUNNING exceeded the step's timeout.
    Timeout,
    /// The engine is shutting down.
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::UserRequested => "user requested",
            StopReason::DependencyUnsatisfied => "dependency unsatisfied",
            StopReason::WorkflowCancelled => "workflow cancelled",
            StopReason::Timeout => "timeout",
            StopReason::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

/// Events that wake the scheduler loop.
///
/// The loop never polls; every admission re-evaluation is driven by one
/// of these arriving on the engine channel or by a timer deadline.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new job entered the store.
    JobSubmitted { id: JobId },
    /// A scheduler timer fired.
    TimerFired { id: TimerId },
    /// Client asked for the job to stop.
    StopRequested { id: JobId, reason: StopReason },
    /// A supervisor committed RUNNING; timeout timers arm here.
    JobStarted { id: JobId },
    /// A job reached a terminal state; its reservation (if any) is gone.
    JobTerminal { id: JobId, status: JobStatus },
    /// A workflow wants its eligible children re-examined.
    WorkflowDirty { id: WorkflowId },
    /// Begin orderly shutdown.
    Shutdown,
}

/// Published on the transition broadcast after each committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
    pub at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
}
