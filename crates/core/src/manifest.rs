// SPDX-License-Identifier: MIT

//! Runtime manifests: the immutable description of an installed sandbox
//! template (`runtime.yml` at the root of a prepared runtime tree).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors from manifest validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("mount source escapes the runtime root: {0}")]
    InvalidMount(String),
    #[error("mount target must be absolute: {0}")]
    RelativeTarget(String),
    #[error("runtime name must not be empty")]
    EmptyName,
}

/// One bind mount from the runtime tree into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Path within the runtime tree (relative to its root).
    pub source: String,
    /// Absolute path inside the sandbox.
    pub target: String,
    #[serde(default)]
    pub readonly: bool,
}

/// Parsed runtime manifest. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
}

impl RuntimeManifest {
    /// Validate the manifest: non-empty name, absolute targets, and no
    /// mount source escaping the runtime root after lexical (symlink-free)
    /// normalization.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.is_empty() {
            return Err(ManifestError::EmptyName);
        }
        for mount in &self.mounts {
            if normalize_within_root(&mount.source).is_none() {
                return Err(ManifestError::InvalidMount(mount.source.clone()));
            }
            if !Path::new(&mount.target).is_absolute() {
                return Err(ManifestError::RelativeTarget(mount.target.clone()));
            }
        }
        Ok(())
    }
}

/// Lexically normalize a relative path, rejecting anything that steps
/// above its root. Symlinks are deliberately not resolved; the sandbox
/// builder bind-mounts the normalized path as-is.
///
/// Returns the normalized path, or `None` if the input is absolute or
/// its `..` components escape the root.
pub fn normalize_within_root(source: &str) -> Option<PathBuf> {
    let path = Path::new(source);
    let mut out = PathBuf::new();
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return None,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                out.pop();
            }
            Component::Normal(part) => {
                depth += 1;
                out.push(part);
            }
        }
    }
    Some(out)
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
