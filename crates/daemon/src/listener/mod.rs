// SPDX-License-Identifier: MIT

//! Listener: socket accept loop and request dispatch.
//!
//! Each connection carries one enveloped request. The listener
//! authorizes the principal, dispatches to the engine, and writes one
//! response, except for the streaming methods which hold the connection
//! and write a frame per record until the stream drains.

mod jobs;
mod resources;
mod streams;
pub mod tls;
mod workflows;

pub use tls::{load_tls_acceptor, TlsError};

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use joblet_core::Clock;
use joblet_engine::Engine;
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};

use crate::auth::{authorize, Principal};
use crate::protocol::{Envelope, ErrorCode, Request, Response};
use crate::protocol_wire::{self, WireError, IO_DEADLINE};

/// Errors from connection handling.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectionError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

/// Shared listener context.
pub struct Listener<S, P, C> {
    engine: Arc<Engine<S, P, C>>,
    shutdown: Arc<Notify>,
}

impl<S, P, C> Listener<S, P, C>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
{
    pub fn new(engine: Arc<Engine<S, P, C>>, shutdown: Arc<Notify>) -> Self {
        Self { engine, shutdown }
    }

    /// Accept Unix-socket connections until shutdown.
    pub async fn run_unix(self: Arc<Self>, socket: UnixListener) {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => return,
                accepted = socket.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_connection(stream),
                    Err(e) => error!("accept error: {e}"),
                },
            }
        }
    }

    /// Accept TCP connections, TLS-wrapped when an acceptor is given.
    pub async fn run_tcp(
        self: Arc<Self>,
        socket: TcpListener,
        acceptor: Option<tokio_rustls::TlsAcceptor>,
    ) {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => return,
                accepted = socket.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "tcp connection");
                        match &acceptor {
                            Some(acceptor) => {
                                let acceptor = acceptor.clone();
                                let this = Arc::clone(&self);
                                tokio::spawn(async move {
                                    match acceptor.accept(stream).await {
                                        Ok(tls) => this.handle_and_log(tls).await,
                                        Err(e) => warn!(%peer, "tls handshake failed: {e}"),
                                    }
                                });
                            }
                            None => self.spawn_connection(stream),
                        }
                    }
                    Err(e) => error!("accept error: {e}"),
                },
            }
        }
    }

    fn spawn_connection<IO>(self: &Arc<Self>, stream: IO)
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.handle_and_log(stream).await;
        });
    }

    async fn handle_and_log<IO>(self: Arc<Self>, stream: IO)
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if let Err(e) = self.handle_connection(stream).await {
            match e {
                ConnectionError::Wire(WireError::Closed) => {
                    debug!("client disconnected")
                }
                ConnectionError::Wire(WireError::Deadline) => warn!("connection timeout"),
                other => error!("connection error: {other}"),
            }
        }
    }

    /// Handle one connection: envelope in, response(s) out.
    async fn handle_connection<IO>(&self, mut stream: IO) -> Result<(), ConnectionError>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let envelope: Envelope = protocol_wire::recv_deadline(&mut stream, IO_DEADLINE).await?;
        let principal = envelope.principal;
        let request = envelope.request;

        if matches!(request, Request::Ping) {
            debug!(principal = %principal.name, request = ?request, "received request");
        } else {
            tracing::info!(principal = %principal.name, request_type = request_name(&request), "received request");
        }

        // Authorization checkpoint before any state mutation.
        if let Err(required) = authorize(&principal, &request) {
            let response = Response::Error {
                code: ErrorCode::Forbidden,
                message: format!(
                    "principal {} lacks the {required} capability",
                    principal.name
                ),
                details: Vec::new(),
            };
            protocol_wire::send_deadline(&mut stream, &response, IO_DEADLINE).await?;
            return Ok(());
        }

        match request {
            Request::StreamLogs { id, from_sequence } => {
                streams::stream_logs(&self.engine, &mut stream, &id, from_sequence).await
            }
            Request::StreamMetrics => streams::stream_metrics(&self.engine, &mut stream).await,
            Request::Shutdown => {
                protocol_wire::send_deadline(&mut stream, &Response::Ok, IO_DEADLINE).await?;
                self.engine.send_shutdown();
                self.shutdown.notify_waiters();
                Ok(())
            }
            other => {
                let response = self.dispatch(other, &principal);
                protocol_wire::send_deadline(&mut stream, &response, IO_DEADLINE).await?;
                Ok(())
            }
        }
    }

    /// Non-streaming dispatch.
    fn dispatch(&self, request: Request, _principal: &Principal) -> Response {
        let engine = &self.engine;
        match request {
            Request::Ping => Response::Pong {
                version: protocol_wire::PROTOCOL_VERSION.to_string(),
            },
            Request::SubmitJob { spec } => jobs::submit(engine, *spec),
            Request::GetJob { id } => jobs::get(engine, &id),
            Request::ListJobs { page, size, filter } => {
                jobs::list(engine, page, size, filter.as_deref())
            }
            Request::StopJob { id } => jobs::stop(engine, &id),
            Request::DeleteJob { id } => jobs::delete(engine, &id),
            Request::DeleteAllJobs => jobs::delete_all(engine),
            Request::ListRuntimes => resources::list_runtimes(engine),
            Request::InstallRuntime { name, source } => {
                resources::install_runtime(engine, &name, &source)
            }
            Request::RemoveRuntime { name } => resources::remove_runtime(engine, &name),
            Request::CreateVolume { name, size, kind } => {
                resources::create_volume(engine, &name, &size, kind)
            }
            Request::DeleteVolume { name } => resources::delete_volume(engine, &name),
            Request::ListVolumes => resources::list_volumes(engine),
            Request::CreateNetwork { name, cidr } => {
                resources::create_network(engine, &name, &cidr)
            }
            Request::DeleteNetwork { name } => resources::delete_network(engine, &name),
            Request::ListNetworks => resources::list_networks(engine),
            Request::SubmitWorkflow {
                yaml,
                create_missing_volumes,
            } => workflows::submit(engine, &yaml, create_missing_volumes),
            Request::GetWorkflow { id } => workflows::get(engine, &id),
            Request::ListWorkflows => workflows::list(engine),
            Request::StopWorkflow { id } => workflows::stop(engine, &id),
            // Streaming and shutdown are handled before dispatch.
            Request::StreamLogs { .. } | Request::StreamMetrics | Request::Shutdown => {
                Response::Error {
                    code: ErrorCode::Internal,
                    message: "streaming request reached dispatch".to_string(),
                    details: Vec::new(),
                }
            }
        }
    }
}

fn request_name(request: &Request) -> &'static str {
    use Request::*;
    match request {
        Ping => "ping",
        SubmitJob { .. } => "submit_job",
        GetJob { .. } => "get_job",
        ListJobs { .. } => "list_jobs",
        StopJob { .. } => "stop_job",
        DeleteJob { .. } => "delete_job",
        DeleteAllJobs => "delete_all_jobs",
        StreamLogs { .. } => "stream_logs",
        StreamMetrics => "stream_metrics",
        ListRuntimes => "list_runtimes",
        InstallRuntime { .. } => "install_runtime",
        RemoveRuntime { .. } => "remove_runtime",
        CreateVolume { .. } => "create_volume",
        DeleteVolume { .. } => "delete_volume",
        ListVolumes => "list_volumes",
        CreateNetwork { .. } => "create_network",
        DeleteNetwork { .. } => "delete_network",
        ListNetworks => "list_networks",
        SubmitWorkflow { .. } => "submit_workflow",
        GetWorkflow { .. } => "get_workflow",
        ListWorkflows => "list_workflows",
        StopWorkflow { .. } => "stop_workflow",
        Shutdown => "shutdown",
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
