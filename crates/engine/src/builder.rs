// SPDX-License-Identifier: MIT

//! Launch-spec derivation: the bridge between a stored job and the
//! sandbox adapter.
//!
//! Environment precedence is manifest defaults, overlaid by job env vars,
//! overlaid by secret env vars. The inherited daemon environment is
//! scrubbed entirely; only what is derived here reaches the child.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use joblet_core::{Clock, Job, JobId, Reservation, RuntimeManifest, HOST_NETWORK, HOST_RUNTIME};
use joblet_sandbox::{
    BuildRequest, NetworkAttachment, ProcessAdapter, SandboxAdapter, SandboxError, VolumeMount,
};

use crate::engine::Engine;

/// Default working directory inside runtime sandboxes.
pub const DEFAULT_WORKDIR: &str = "/work";

impl<S, P, C> Engine<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    /// Resolve how the job joins a network.
    ///
    /// `host` stays in the init namespace; everything else must already
    /// exist in the network registry and is materialized lazily as a
    /// pinned namespace file.
    pub(crate) async fn network_attachment(
        &self,
        job: &Job,
    ) -> Result<NetworkAttachment, SandboxError> {
        if job.network == HOST_NETWORK {
            return Ok(NetworkAttachment::Host);
        }
        if !self.networks.lock().contains_key(&job.network) {
            return Err(SandboxError::BuildFailed(format!(
                "unknown network: {}",
                job.network
            )));
        }
        let path = if job.network == joblet_core::BRIDGE_NETWORK {
            joblet_sandbox::netns::ensure_bridge().await
        } else {
            joblet_sandbox::netns::ensure_netns(&job.network).await
        }
        .map_err(SandboxError::BuildFailed)?;
        Ok(NetworkAttachment::Netns(path))
    }

    /// Derive the full environment for a job: manifest defaults, then job
    /// vars, then secrets, plus the engine's own marker variables.
    /// Secret values are never logged.
    pub(crate) fn derive_env(
        &self,
        job: &Job,
        manifest: Option<&RuntimeManifest>,
        reservation: &Reservation,
    ) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: &str, env: &mut Vec<(String, String)>| {
            if let Some(slot) = env.iter_mut().find(|(k, _)| k == key) {
                slot.1 = value.to_string();
            } else {
                env.push((key.to_string(), value.to_string()));
            }
        };

        if let Some(manifest) = manifest {
            for (key, value) in &manifest.environment {
                push(key, value, &mut env);
            }
        }
        for (key, value) in &job.env {
            push(key, value, &mut env);
        }
        for (key, value) in self.vault.get(&job.id) {
            push(&key, &value, &mut env);
        }

        push("JOBLET_JOB_ID", job.id.as_str(), &mut env);
        if !reservation.gpu_indices.is_empty() {
            let gpus: Vec<String> = reservation
                .gpu_indices
                .iter()
                .map(|gpu| gpu.to_string())
                .collect();
            push("JOBLET_VISIBLE_GPUS", &gpus.join(","), &mut env);
        }
        env
    }

    /// Assemble the sandbox build request for an admitted job.
    pub(crate) async fn build_request(
        &self,
        job: &Job,
        reservation: Reservation,
        abort: Arc<AtomicBool>,
    ) -> Result<BuildRequest, SandboxError> {
        let manifest = if job.runtime == HOST_RUNTIME {
            None
        } else {
            Some(self.registry.lookup(&job.runtime).map_err(|e| {
                SandboxError::BuildFailed(format!("runtime lookup: {e}"))
            })?)
        };
        let runtime_dir = manifest
            .as_ref()
            .map(|m| self.storage.layout().runtime_dir(&m.name));

        let volume_mounts: Vec<VolumeMount> = {
            let volumes = self.volumes.lock();
            job.volumes
                .iter()
                .filter_map(|name| volumes.get(name))
                .map(|volume| VolumeMount {
                    name: volume.name.clone(),
                    kind: volume.kind,
                    host_dir: match volume.kind {
                        joblet_core::VolumeKind::Filesystem => {
                            Some(self.storage.layout().volume_dir(&volume.name))
                        }
                        joblet_core::VolumeKind::Memory => None,
                    },
                    size_bytes: volume.size_bytes,
                    target: volume.mount_path.clone(),
                })
                .collect()
        };

        let network = self.network_attachment(job).await?;
        let env = self.derive_env(job, manifest.as_ref(), &reservation);
        let workdir = job
            .workdir
            .clone()
            .unwrap_or_else(|| DEFAULT_WORKDIR.to_string());

        Ok(BuildRequest {
            job_id: job.id.clone(),
            command: job.command.clone(),
            args: job.args.clone(),
            runtime_dir,
            manifest,
            reservation,
            resources: job.resources.clone(),
            volumes: volume_mounts,
            uploads: job.uploads.clone(),
            upload_dirs: job.upload_dirs.clone(),
            env,
            workdir,
            network,
            abort,
        })
    }

    /// Abort flag for a job, creating it on first use.
    pub(crate) fn abort_flag(&self, id: &JobId) -> Arc<AtomicBool> {
        Arc::clone(
            self.abort_flags
                .lock()
                .entry(id.clone())
                .or_insert_with(|| Arc::new(AtomicBool::new(false))),
        )
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
