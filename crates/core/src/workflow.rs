// SPDX-License-Identifier: MIT

//! Workflow entity: a DAG of jobs submitted as one unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::{JobId, JobStatus};

/// Unique identifier for a workflow. UUIDv4, minted at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for WorkflowId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Status derived from the workflow's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    /// All children terminal, none failed, at least one stopped.
    Stopped,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// A registered workflow instance.
///
/// `jobs` is the children in topological submission order; retry attempts
/// are appended as they are created so earlier attempts stay visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub jobs: Vec<JobId>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        name: String,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            jobs: Vec::new(),
            status: WorkflowStatus::Running,
            created_at,
        }
    }

    /// Recompute the derived status from child states.
    ///
    /// RUNNING while any child is non-terminal; otherwise FAILED if any
    /// child failed, COMPLETED if all completed, STOPPED for the
    /// cancelled-but-nothing-failed case.
    pub fn derive_status(children: impl IntoIterator<Item = JobStatus>) -> WorkflowStatus {
        let mut any_failed = false;
        let mut any_stopped = false;
        let mut saw_any = false;
        for status in children {
            saw_any = true;
            if !status.is_terminal() {
                return WorkflowStatus::Running;
            }
            match status {
                JobStatus::Failed => any_failed = true,
                JobStatus::Stopped => any_stopped = true,
                _ => {}
            }
        }
        if !saw_any {
            return WorkflowStatus::Running;
        }
        if any_failed {
            WorkflowStatus::Failed
        } else if any_stopped {
            WorkflowStatus::Stopped
        } else {
            WorkflowStatus::Completed
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
