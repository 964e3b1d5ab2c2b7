// SPDX-License-Identifier: MIT

//! Workflow request handlers.

use joblet_core::{Clock, WorkflowId};
use joblet_engine::Engine;
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};

use crate::protocol::Response;
use crate::protocol_types::JobDto;

pub(super) fn submit<S, P, C>(
    engine: &Engine<S, P, C>,
    yaml: &str,
    create_missing_volumes: bool,
) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.submit_workflow(yaml, create_missing_volumes) {
        Ok((workflow_id, job_ids)) => Response::WorkflowSubmitted {
            workflow_id: workflow_id.to_string(),
            job_ids: job_ids.iter().map(|id| id.to_string()).collect(),
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
    match engine.get_workflow(&WorkflowId::new(id)) {
        Ok((workflow, jobs)) => Response::Workflow {
            workflow,
            jobs: jobs
                .iter()
                .map(|job| JobDto::render(job, engine.is_waiting(job)))
                .collect(),
        },
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn list<S, P, C>(engine: &Engine<S, P, C>) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    Response::Workflows {
        workflows: engine.list_workflows(),
    }
}

pub(super) fn stop<S, P, C>(engine: &Engine<S, P, C>, id: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.cancel_workflow(&WorkflowId::new(id)) {
        Ok(()) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}
