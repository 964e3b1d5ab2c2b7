// SPDX-License-Identifier: MIT

//! Error taxonomy surfaced on the RPC boundary.

use thiserror::Error;

/// Errors from engine operations. Each variant maps to a stable wire code.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unknown runtime: {0}")]
    UnknownRuntime(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("already terminal: {0}")]
    AlreadyTerminal(String),
    #[error("still running: {0}")]
    StillRunning(String),
    #[error("in use: {0}")]
    InUse(String),
    #[error("insufficient resources: {0}")]
    Insufficient(String),
    #[error("workflow parse error: {0}")]
    ParseError(String),
    #[error("workflow dependency cycle: {0:?}")]
    CycleDetected(Vec<String>),
    #[error("missing volumes: {0:?}")]
    MissingVolumes(Vec<String>),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<joblet_storage::StorageError> for EngineError {
    fn from(e: joblet_storage::StorageError) -> Self {
        EngineError::Internal(e.to_string())
    }
}
