// SPDX-License-Identifier: MIT

//! Job request handlers.

use joblet_core::{Clock, JobId};
use joblet_engine::Engine;
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};

use crate::protocol::{ErrorCode, Response};
use crate::protocol_types::{ExecuteRequest, JobDto};

pub(super) fn submit<S, P, C>(engine: &Engine<S, P, C>, request: ExecuteRequest) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    let (spec, secrets) = match request.into_spec() {
        Ok(parts) => parts,
        Err(message) => {
            return Response::Error {
                code: ErrorCode::InvalidRequest,
                message,
                details: Vec::new(),
            }
        }
    };
    match engine.submit_job(spec, secrets) {
        Ok(job) => Response::Submitted {
            job_id: job.id.to_string(),
            status: job.status.to_string(),
        },
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn get<S, P, C>(engine: &Engine<S, P, C>, id: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.get_job(&JobId::new(id)) {
        Ok(job) => Response::Job {
            job: JobDto::render(&job, engine.is_waiting(&job)),
        },
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn list<S, P, C>(
    engine: &Engine<S, P, C>,
    page: usize,
    size: usize,
    filter: Option<&str>,
) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    let (jobs, total) = engine.list_jobs(page, size, filter);
    Response::Jobs {
        jobs: jobs
            .iter()
            .map(|job| JobDto::render(job, engine.is_waiting(job)))
            .collect(),
        total,
    }
}

pub(super) fn stop<S, P, C>(engine: &Engine<S, P, C>, id: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.stop_job(&JobId::new(id)) {
        Ok(()) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn delete<S, P, C>(engine: &Engine<S, P, C>, id: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.delete_job(&JobId::new(id)) {
        Ok(()) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn delete_all<S, P, C>(engine: &Engine<S, P, C>) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    let (deleted, skipped) = engine.delete_all_jobs();
    Response::Deleted { deleted, skipped }
}
