// SPDX-License-Identifier: MIT

//! Workflow resolver: template → child jobs, condition semantics,
//! retries, and derived status.
//!
//! Submission parses and validates the template, topologically sorts it,
//! and creates one QUEUED/WAITING child per step with dependency lists
//! translated to job UUIDs. Everything after that is driven by terminal
//! transitions arriving in the scheduler loop: dependents whose
//! requirements became impossible stop with `DependencyUnsatisfied`,
//! failed steps with budget left get retried as fresh jobs, and the
//! workflow's derived status is recomputed.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use joblet_core::{
    Clock, DependencySpec, DirUpload, Job, JobId, JobSpec, JobStatus, StopReason, TimerId, Upload,
    Workflow, WorkflowId,
};
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};
use joblet_workflow::{parse_template, topo_sort, StepSpec, StepUploads, WorkflowTemplate};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::timers::TimerTable;

/// Upload payloads captured for one step at submission time.
#[derive(Clone, Default)]
pub(crate) struct StagedUploads {
    pub files: Vec<Upload>,
    pub directories: Vec<DirUpload>,
}

/// Resolver-side state for one workflow.
pub(crate) struct WorkflowEntry {
    pub workflow: Workflow,
    pub template: Option<WorkflowTemplate>,
    /// Step name for each child job (all attempts).
    pub step_of_job: HashMap<JobId, String>,
    /// Latest attempt for each step; the one that counts for status
    /// derivation and downstream dependencies.
    pub latest: HashMap<String, JobId>,
    /// Attempts consumed per step (first run = 1).
    pub attempts: HashMap<String, u32>,
    /// Upload contents read once at submission, so retry attempts ship
    /// the same bytes even if the source files changed since.
    pub staged: HashMap<String, StagedUploads>,
    pub cancelled: bool,
}

impl WorkflowEntry {
    /// Rehydrate a persisted workflow. The template is gone, which is
    /// fine: recovered workflows are terminal history, not live DAGs.
    pub fn recovered(workflow: Workflow) -> Self {
        Self {
            workflow,
            template: None,
            step_of_job: HashMap::new(),
            latest: HashMap::new(),
            attempts: HashMap::new(),
            staged: HashMap::new(),
            cancelled: false,
        }
    }
}

impl<S, P, C> Engine<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    /// Submit a workflow from YAML bytes.
    ///
    /// Fails without side effects on parse errors, cycles, and missing
    /// volumes (unless `create_missing_volumes`). On success every child
    /// is registered in topological order and the scheduler is woken.
    pub fn submit_workflow(
        &self,
        yaml: &str,
        create_missing_volumes: bool,
    ) -> Result<(WorkflowId, Vec<JobId>), EngineError> {
        let template = parse_template(yaml).map_err(|e| EngineError::ParseError(e.to_string()))?;
        let order = topo_sort(&template).map_err(|e| EngineError::CycleDetected(e.steps))?;

        let missing: Vec<String> = {
            let volumes = self.volumes.lock();
            template
                .required_volumes()
                .into_iter()
                .filter(|name| !volumes.contains_key(name))
                .collect()
        };
        if !missing.is_empty() {
            if !create_missing_volumes {
                return Err(EngineError::MissingVolumes(missing));
            }
            for name in &missing {
                self.create_volume_default(name)?;
            }
        }

        // Validate runtimes and networks, and read every upload the
        // template names, up front: child submission must not fail
        // halfway through a workflow.
        let mut staged: HashMap<String, StagedUploads> = HashMap::new();
        for (step_name, step) in &template.jobs {
            if let Some(runtime) = step.runtime.as_deref() {
                if runtime != joblet_core::HOST_RUNTIME && !self.registry.contains(runtime) {
                    return Err(EngineError::UnknownRuntime(format!(
                        "{runtime} (step {step_name})"
                    )));
                }
            }
            if let Some(network) = step.network.as_deref() {
                if !self.networks.lock().contains_key(network) {
                    return Err(EngineError::InvalidRequest(format!(
                        "unknown network {network} (step {step_name})"
                    )));
                }
            }
            if let Some(uploads) = &step.uploads {
                let payloads = stage_uploads(uploads).map_err(|e| {
                    EngineError::InvalidRequest(format!("step {step_name} uploads: {e}"))
                })?;
                staged.insert(step_name.clone(), payloads);
            }
        }

        let workflow_id = WorkflowId::generate();
        let mut workflow = Workflow::new(
            workflow_id.clone(),
            template.name.clone(),
            template.description.clone(),
            self.clock.utc_now(),
        );

        let mut latest: HashMap<String, JobId> = HashMap::new();
        let mut step_of_job: HashMap<JobId, String> = HashMap::new();
        let mut attempts: HashMap<String, u32> = HashMap::new();
        let mut job_ids = Vec::with_capacity(order.len());

        for step_name in &order {
            let step = &template.jobs[step_name.as_str()];
            let payloads = staged.get(step_name).cloned().unwrap_or_default();
            let spec = step_to_spec(step, &latest, payloads)
                .map_err(|e| EngineError::ParseError(format!("step {step_name}: {e}")))?;
            let timeout = step
                .timeout_duration()
                .map_err(|e| EngineError::ParseError(format!("step {step_name}: {e}")))?;
            let job = self.submit_internal(spec, Vec::new(), Some(workflow_id.clone()), timeout)?;

            latest.insert(step_name.clone(), job.id.clone());
            step_of_job.insert(job.id.clone(), step_name.clone());
            attempts.insert(step_name.clone(), 1);
            workflow.jobs.push(job.id.clone());
            job_ids.push(job.id);
        }

        if let Err(e) = self.storage.write_workflow(&workflow) {
            tracing::warn!(workflow_id = %workflow_id, error = %e, "workflow record write failed");
        }
        self.workflows.lock().insert(
            workflow_id.clone(),
            WorkflowEntry {
                workflow,
                template: Some(template),
                step_of_job,
                latest,
                attempts,
                staged,
                cancelled: false,
            },
        );

        tracing::info!(workflow_id = %workflow_id, steps = job_ids.len(), "workflow submitted");
        Ok((workflow_id, job_ids))
    }

    /// React to a terminal transition: stop dependents whose requirements
    /// became impossible, schedule retries, recompute workflow status.
    /// Runs in the scheduler loop so the cascade is serialized with
    /// admission.
    pub(crate) fn resolve_terminal(&self, job: &Job, timers: &mut TimerTable) {
        self.stop_contradicted_dependents(job);

        let Some(workflow_id) = job.workflow_id.clone() else {
            return;
        };

        // Retry bookkeeping needs the template; decide under the lock,
        // act outside it.
        let retry: Option<(String, Duration)> = {
            let mut workflows = self.workflows.lock();
            let Some(entry) = workflows.get_mut(&workflow_id) else {
                return;
            };
            let step_name = entry.step_of_job.get(&job.id).cloned();
            match (&step_name, &entry.template) {
                (Some(step_name), Some(template))
                    if job.status == JobStatus::Failed && !entry.cancelled =>
                {
                    let step = &template.jobs[step_name.as_str()];
                    let used = entry.attempts.get(step_name).copied().unwrap_or(1);
                    if used <= step.retries {
                        Some((step_name.clone(), self.config.retry_gap))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };

        match retry {
            Some((step_name, gap)) => {
                // A pending retry means the workflow can still progress;
                // recomputing now would misread the failed attempt as the
                // step's outcome.
                tracing::info!(workflow_id = %workflow_id, step = %step_name, "scheduling retry");
                timers.set(
                    TimerId::retry(&workflow_id, &step_name),
                    gap,
                    self.clock.now(),
                );
            }
            None => self.recompute_workflow(&workflow_id),
        }
    }

    /// Stop every QUEUED/SCHEDULED dependent whose dependency on `job`
    /// can no longer be satisfied. Cascades through the resulting
    /// terminal events.
    fn stop_contradicted_dependents(&self, job: &Job) {
        let dependent_ids = self
            .dependents
            .lock()
            .get(&job.id)
            .cloned()
            .unwrap_or_default();

        for dependent_id in dependent_ids {
            let Some(dependent) = self.store.get(&dependent_id) else {
                continue;
            };
            if dependent.is_terminal() {
                continue;
            }
            let contradiction = dependent.depends_on.iter().any(|dep| {
                dep.job_id == job.id && dep.required.contradicted_by(job.status)
            });
            if !contradiction {
                continue;
            }
            self.stop_pending(
                &dependent,
                StopReason::DependencyUnsatisfied,
                &format!(
                    "dependency unsatisfied: {} ended {}",
                    job.id, job.status
                ),
            );
        }
    }

    /// Stop a QUEUED or SCHEDULED job (no reservation held). Used for
    /// dependency contradictions and workflow cancellation.
    pub(crate) fn stop_pending(&self, job: &Job, reason: StopReason, message: &str) {
        use crate::jobs::TransitionAttrs;
        use joblet_core::LogChannel;

        let attrs = TransitionAttrs {
            ended_at: Some(self.clock.utc_now()),
            stop_reason: Some(reason),
            ..Default::default()
        };
        match self
            .store
            .transition(&job.id, job.status, JobStatus::Stopped, attrs)
        {
            Ok(stopped) => {
                self.append_log(&job.id, LogChannel::System, message);
                self.finalize_terminal(&stopped);
            }
            Err(e) => {
                // Lost a race with admission or another stop; the other
                // path owns the terminal bookkeeping.
                tracing::debug!(job_id = %job.id, error = %e, "pending stop refused");
            }
        }
    }

    /// Fire a retry timer: create the next attempt as a fresh job.
    pub(crate) fn retry_step(&self, workflow_id: &WorkflowId, step_name: &str) {
        let spec_and_timeout = {
            let workflows = self.workflows.lock();
            let Some(entry) = workflows.get(workflow_id) else {
                return;
            };
            if entry.cancelled {
                return;
            }
            let Some(template) = &entry.template else {
                return;
            };
            let Some(step) = template.jobs.get(step_name) else {
                return;
            };
            let payloads = entry.staged.get(step_name).cloned().unwrap_or_default();
            let spec = match step_to_spec(step, &entry.latest, payloads) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::error!(workflow_id = %workflow_id, step = step_name, error = %e, "retry spec failed");
                    return;
                }
            };
            let timeout = step.timeout_duration().ok().flatten();
            Some((spec, timeout))
        };
        let Some((spec, timeout)) = spec_and_timeout else {
            return;
        };

        let job = match self.submit_internal(spec, Vec::new(), Some(workflow_id.clone()), timeout) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(workflow_id = %workflow_id, step = step_name, error = %e, "retry submission failed");
                return;
            }
        };

        {
            let mut workflows = self.workflows.lock();
            if let Some(entry) = workflows.get_mut(workflow_id) {
                entry.latest.insert(step_name.to_string(), job.id.clone());
                entry
                    .step_of_job
                    .insert(job.id.clone(), step_name.to_string());
                *entry.attempts.entry(step_name.to_string()).or_insert(0) += 1;
                entry.workflow.jobs.push(job.id.clone());
                if let Err(e) = self.storage.write_workflow(&entry.workflow) {
                    tracing::warn!(workflow_id = %workflow_id, error = %e, "workflow record write failed");
                }
            }
        }
        tracing::info!(workflow_id = %workflow_id, step = step_name, job_id = %job.id, "retry attempt submitted");
    }

    /// Execute a workflow cancellation decided earlier: stop pending
    /// children, SIGTERM running ones.
    pub(crate) fn enforce_workflow_cancel(&self, workflow_id: &WorkflowId, timers: &mut TimerTable) {
        let children: Vec<JobId> = {
            let workflows = self.workflows.lock();
            match workflows.get(workflow_id) {
                Some(entry) if entry.cancelled => entry.workflow.jobs.clone(),
                _ => return,
            }
        };
        for child_id in children {
            let Some(child) = self.store.get(&child_id) else {
                continue;
            };
            match child.status {
                JobStatus::Queued | JobStatus::Scheduled => {
                    self.stop_pending(&child, StopReason::WorkflowCancelled, "workflow cancelled");
                    timers.cancel(&TimerId::schedule(&child_id));
                }
                JobStatus::Initializing | JobStatus::Running => {
                    self.request_stop(&child, StopReason::WorkflowCancelled, timers);
                }
                _ => {}
            }
        }
        self.recompute_workflow(workflow_id);
    }

    /// Recompute the derived status from the latest attempt of each step
    /// and persist on change.
    pub(crate) fn recompute_workflow(&self, workflow_id: &WorkflowId) {
        let mut workflows = self.workflows.lock();
        let Some(entry) = workflows.get_mut(workflow_id) else {
            return;
        };
        let children: Vec<JobStatus> = if entry.latest.is_empty() {
            entry
                .workflow
                .jobs
                .iter()
                .filter_map(|id| self.store.get(id))
                .map(|job| job.status)
                .collect()
        } else {
            entry
                .latest
                .values()
                .filter_map(|id| self.store.get(id))
                .map(|job| job.status)
                .collect()
        };
        let derived = Workflow::derive_status(children);
        if derived != entry.workflow.status {
            tracing::info!(workflow_id = %workflow_id, status = %derived, "workflow status");
            entry.workflow.status = derived;
            if let Err(e) = self.storage.write_workflow(&entry.workflow) {
                tracing::warn!(workflow_id = %workflow_id, error = %e, "workflow record write failed");
            }
        }
    }
}

/// Read a step's upload references from the host filesystem.
///
/// Workflow YAML names paths, not bytes (the same server-side path
/// convention runtime installs use for `source`): file entries become
/// single uploads named by their basename, directory entries become
/// whole-tree uploads with paths relative to the directory.
fn stage_uploads(uploads: &StepUploads) -> std::io::Result<StagedUploads> {
    let mut staged = StagedUploads::default();
    for file in &uploads.files {
        let path = Path::new(file);
        let name = path_basename(path)?;
        let mut upload = read_upload(path, name)?;
        upload.mode = file_mode(path);
        staged.files.push(upload);
    }
    for dir in &uploads.directories {
        let root = Path::new(dir);
        let name = path_basename(root)?;
        let mut files = Vec::new();
        collect_tree(root, Path::new(""), &mut files)?;
        staged.directories.push(DirUpload { name, files });
    }
    Ok(staged)
}

fn path_basename(path: &Path) -> std::io::Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no file name in {}", path.display()),
            )
        })
}

fn read_upload(path: &Path, name: String) -> std::io::Result<Upload> {
    Ok(Upload {
        name,
        content: std::fs::read(path)?,
        mode: None,
    })
}

/// Walk a directory, producing uploads named by their path relative to
/// the walked root.
fn collect_tree(root: &Path, rel: &Path, out: &mut Vec<Upload>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root.join(rel))? {
        let entry = entry?;
        let entry_rel = rel.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            collect_tree(root, &entry_rel, out)?;
        } else {
            let path = root.join(&entry_rel);
            let mut upload = read_upload(&path, entry_rel.to_string_lossy().into_owned())?;
            upload.mode = file_mode(&path);
            out.push(upload);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|meta| meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

/// Translate a template step into a job spec, mapping `dependsOn` to the
/// latest attempt of each referenced step and attaching its staged
/// upload payloads.
fn step_to_spec(
    step: &StepSpec,
    latest: &HashMap<String, JobId>,
    uploads: StagedUploads,
) -> Result<JobSpec, EngineError> {
    let resources = step
        .resources
        .to_request()
        .map_err(|e| EngineError::ParseError(e.to_string()))?;
    let depends_on: Vec<DependencySpec> = step
        .depends_on
        .iter()
        .map(|dep| {
            latest
                .get(&dep.step)
                .cloned()
                .map(|job_id| DependencySpec {
                    job_id,
                    required: dep.required,
                })
                .ok_or_else(|| {
                    EngineError::Internal(format!("unresolved step reference: {}", dep.step))
                })
        })
        .collect::<Result<_, _>>()?;

    Ok(JobSpec {
        command: step.command[0].clone(),
        args: step.command[1..].to_vec(),
        runtime: step.runtime.clone(),
        resources,
        env: step
            .env_vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        volumes: step.volumes.clone(),
        network: step.network.clone(),
        uploads: uploads.files,
        upload_dirs: uploads.directories,
        workdir: step.workdir.clone(),
        schedule_at: None,
        depends_on,
    })
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
