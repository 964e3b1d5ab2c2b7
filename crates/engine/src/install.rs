// SPDX-License-Identifier: MIT

//! Runtime installation as a meta-job.
//!
//! `InstallRuntime` submits an ordinary host-runtime job that runs the
//! source tree's build script with `JOBLET_RUNTIME_TARGET` pointing at the
//! runtime's directory under the state dir. Its logs flow through the log
//! bus like any other job's. When the meta-job completes, the engine
//! parses `runtime.yml` from the built tree and registers the manifest.

use std::path::Path;

use joblet_core::{Clock, JobId, JobSpec, JobStatus, RuntimeManifest};
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};

use crate::engine::Engine;
use crate::error::EngineError;

/// Build script expected at the root of a runtime source tree.
const BUILD_SCRIPT: &str = "build.sh";

impl<S, P, C> Engine<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    /// Start a runtime install. Returns the build job's id; registration
    /// happens when that job completes.
    pub fn install_runtime(&self, name: &str, source: &str) -> Result<JobId, EngineError> {
        if self.registry.contains(name) {
            return Err(EngineError::DuplicateName(format!("runtime {name}")));
        }
        if self.pending_installs.lock().values().any(|n| n == name) {
            return Err(EngineError::DuplicateName(format!(
                "runtime {name} (install in progress)"
            )));
        }

        let source_path = Path::new(source);
        let script = if source_path.extension().and_then(|e| e.to_str()) == Some("sh") {
            source_path.to_path_buf()
        } else {
            source_path.join(BUILD_SCRIPT)
        };

        let target = self.storage.layout().runtime_dir(name);
        std::fs::create_dir_all(&target)
            .map_err(|e| EngineError::Internal(format!("runtime target dir: {e}")))?;

        let spec = JobSpec {
            command: "bash".to_string(),
            args: vec![script.display().to_string()],
            env: [
                ("JOBLET_RUNTIME_NAME".to_string(), name.to_string()),
                (
                    "JOBLET_RUNTIME_TARGET".to_string(),
                    target.display().to_string(),
                ),
            ]
            .into_iter()
            .collect(),
            workdir: Some(source.to_string()),
            ..Default::default()
        };

        let job = self.submit_internal(spec, Vec::new(), None, None)?;
        self.pending_installs
            .lock()
            .insert(job.id.clone(), name.to_string());
        tracing::info!(runtime = name, job_id = %job.id, "runtime install started");
        Ok(job.id)
    }

    /// Called for every terminal job; registers the runtime when the job
    /// was a pending install that completed.
    pub(crate) fn finish_install(&self, job_id: &JobId) {
        let Some(name) = self.pending_installs.lock().remove(job_id) else {
            return;
        };
        let Some(job) = self.store.get(job_id) else {
            return;
        };
        if job.status != JobStatus::Completed {
            tracing::warn!(runtime = %name, job_id = %job_id, status = %job.status, "runtime install failed");
            return;
        }

        let manifest_path = self
            .storage
            .layout()
            .runtime_dir(&name)
            .join("runtime.yml");
        let manifest: RuntimeManifest = match std::fs::read_to_string(&manifest_path)
            .map_err(|e| e.to_string())
            .and_then(|yaml| serde_yaml::from_str(&yaml).map_err(|e| e.to_string()))
        {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!(runtime = %name, error = %e, "runtime manifest unreadable");
                return;
            }
        };
        if manifest.name != name {
            tracing::error!(
                runtime = %name,
                manifest_name = %manifest.name,
                "manifest name mismatch, not registering"
            );
            return;
        }
        match self.registry.register(manifest) {
            Ok(()) => tracing::info!(runtime = %name, "runtime installed"),
            Err(e) => tracing::error!(runtime = %name, error = %e, "runtime registration failed"),
        }
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
