// SPDX-License-Identifier: MIT

//! Persisted job and workflow records.
//!
//! Records are small standalone JSON files, written atomically via a
//! sibling temp file + rename so a crash mid-write never leaves a torn
//! record behind.

use std::path::Path;
use thiserror::Error;

use joblet_core::{Job, Workflow};

use crate::layout::StateLayout;

/// Errors from persisted-state IO.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Reader/writer for the state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    layout: StateLayout,
}

impl StateStore {
    pub fn new(layout: StateLayout) -> Result<Self, StorageError> {
        layout.ensure_dirs()?;
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Persist a job record (called at terminal transitions).
    pub fn write_job(&self, job: &Job) -> Result<(), StorageError> {
        write_json(&self.layout.job_path(job.id.as_str()), job)
    }

    /// Remove a job's record and log file.
    pub fn delete_job(&self, job_id: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.layout.job_path(job_id))?;
        remove_if_exists(&self.layout.log_path(job_id))?;
        Ok(())
    }

    /// Load every persisted job record. Corrupt files are skipped with a
    /// warning; recovery is best-effort by design.
    pub fn load_jobs(&self) -> Result<Vec<Job>, StorageError> {
        load_dir(&self.layout.jobs_dir())
    }

    pub fn write_workflow(&self, workflow: &Workflow) -> Result<(), StorageError> {
        write_json(&self.layout.workflow_path(workflow.id.as_str()), workflow)
    }

    pub fn delete_workflow(&self, id: &str) -> Result<(), StorageError> {
        remove_if_exists(&self.layout.workflow_path(id))
    }

    pub fn load_workflows(&self) -> Result<Vec<Workflow>, StorageError> {
        load_dir(&self.layout.workflows_dir())
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| StorageError::Corrupt {
        path: path.display().to_string(),
        source: e,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn load_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
    let mut records = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = std::fs::read(&path)?;
        match serde_json::from_slice(&bytes) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping corrupt record");
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
