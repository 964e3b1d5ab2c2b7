// SPDX-License-Identifier: MIT

//! Named volumes shared into sandboxes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from volume operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VolumeError {
    #[error("invalid volume name: {0}")]
    InvalidName(String),
    #[error("volume already exists: {0}")]
    DuplicateName(String),
    #[error("volume not found: {0}")]
    NotFound(String),
    #[error("volume in use: {0} ({1} jobs)")]
    InUse(String, u32),
}

/// Backing store for a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    /// Directory on the state-dir filesystem.
    Filesystem,
    /// tmpfs mounted per-sandbox, sized by `size_bytes`.
    Memory,
}

impl fmt::Display for VolumeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeKind::Filesystem => write!(f, "filesystem"),
            VolumeKind::Memory => write!(f, "memory"),
        }
    }
}

/// A named volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub kind: VolumeKind,
    pub size_bytes: u64,
    /// Mount point inside sandboxes (`/volumes/<name>`).
    pub mount_path: String,
    pub created_at: DateTime<Utc>,
    /// Number of non-terminal jobs referencing this volume.
    pub in_use: u32,
}

impl Volume {
    pub fn new(name: &str, kind: VolumeKind, size_bytes: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            size_bytes,
            mount_path: format!("/volumes/{name}"),
            created_at,
            in_use: 0,
        }
    }
}

/// Validate a volume name: `[A-Za-z0-9][A-Za-z0-9_-]{0,62}`.
pub fn validate_name(name: &str) -> Result<(), VolumeError> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => chars
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        _ => false,
    };
    if ok && name.len() <= 63 {
        Ok(())
    } else {
        Err(VolumeError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
#[path = "volume_tests.rs"]
mod tests;
