// SPDX-License-Identifier: MIT

//! Runtime registry: name → manifest catalog.
//!
//! Registration happens when an install meta-job completes; everything
//! else is concurrent reads, so a single RwLock fits.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use joblet_core::RuntimeManifest;

use crate::error::EngineError;

/// Catalog of installed sandbox templates.
#[derive(Default)]
pub struct RuntimeRegistry {
    runtimes: RwLock<BTreeMap<String, RuntimeManifest>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest under its name.
    ///
    /// Fails with `DuplicateName` when present, `InvalidRequest` when any
    /// mount source escapes the runtime root after symlink-free
    /// normalization.
    pub fn register(&self, manifest: RuntimeManifest) -> Result<(), EngineError> {
        manifest
            .validate()
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        let mut runtimes = self.runtimes.write();
        if runtimes.contains_key(&manifest.name) {
            return Err(EngineError::DuplicateName(manifest.name));
        }
        tracing::info!(runtime = %manifest.name, version = %manifest.version, "registered runtime");
        runtimes.insert(manifest.name.clone(), manifest);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<RuntimeManifest, EngineError> {
        self.runtimes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownRuntime(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runtimes.read().contains_key(name)
    }

    /// All manifests, ordered by name.
    pub fn list(&self) -> Vec<RuntimeManifest> {
        self.runtimes.read().values().cloned().collect()
    }

    /// Remove a runtime. The engine checks for referencing jobs before
    /// calling this; the registry itself only knows names.
    pub fn unregister(&self, name: &str) -> Result<RuntimeManifest, EngineError> {
        self.runtimes
            .write()
            .remove(name)
            .ok_or_else(|| EngineError::NotFound(format!("runtime {name}")))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
