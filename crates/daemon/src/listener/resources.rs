// SPDX-License-Identifier: MIT

//! Runtime, volume, and network request handlers.

use joblet_core::{Clock, VolumeKind};
use joblet_engine::Engine;
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};

use crate::protocol::Response;

pub(super) fn list_runtimes<S, P, C>(engine: &Engine<S, P, C>) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    Response::Runtimes {
        runtimes: engine.list_runtimes(),
    }
}

pub(super) fn install_runtime<S, P, C>(
    engine: &Engine<S, P, C>,
    name: &str,
    source: &str,
) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.install_runtime(name, source) {
        Ok(job_id) => Response::InstallStarted {
            build_job_id: job_id.to_string(),
        },
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn remove_runtime<S, P, C>(engine: &Engine<S, P, C>, name: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.remove_runtime(name) {
        Ok(()) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn create_volume<S, P, C>(
    engine: &Engine<S, P, C>,
    name: &str,
    size: &str,
    kind: VolumeKind,
) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.create_volume(name, size, kind) {
        Ok(_) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn delete_volume<S, P, C>(engine: &Engine<S, P, C>, name: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.delete_volume(name) {
        Ok(()) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn list_volumes<S, P, C>(engine: &Engine<S, P, C>) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    Response::Volumes {
        volumes: engine.list_volumes(),
    }
}

pub(super) fn create_network<S, P, C>(engine: &Engine<S, P, C>, name: &str, cidr: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.create_network(name, cidr) {
        Ok(_) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn delete_network<S, P, C>(engine: &Engine<S, P, C>, name: &str) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    match engine.delete_network(name) {
        Ok(()) => Response::Ok,
        Err(e) => Response::from_engine_error(&e),
    }
}

pub(super) fn list_networks<S, P, C>(engine: &Engine<S, P, C>) -> Response
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    Response::Networks {
        networks: engine.list_networks(),
    }
}
