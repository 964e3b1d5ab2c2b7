// SPDX-License-Identifier: MIT

//! Streaming handlers: log and metrics frames over a held connection.

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use joblet_core::{Clock, JobId};
use joblet_engine::Engine;
use joblet_sandbox::{ProcessAdapter, SandboxAdapter};

use super::ConnectionError;
use crate::protocol::Response;
use crate::protocol_wire::{self, IO_DEADLINE};

/// How long a log stream keeps draining after the job went terminal.
const DRAIN_WINDOW: Duration = Duration::from_secs(5);

async fn write_frame<IO>(stream: &mut IO, response: &Response) -> Result<(), ConnectionError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    protocol_wire::send(stream, response).await?;
    Ok(())
}

/// Stream a job's log records: ring history first, then live records,
/// ending after the job terminates plus a drain window. Client
/// disconnects never affect the job.
pub(super) async fn stream_logs<S, P, C, IO>(
    engine: &Engine<S, P, C>,
    stream: &mut IO,
    id: &str,
    from_sequence: i64,
) -> Result<(), ConnectionError>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    let job_id = JobId::new(id);
    let mut subscription = match engine.stream_logs(&job_id, from_sequence) {
        Ok(subscription) => subscription,
        Err(e) => {
            let response = Response::from_engine_error(&e);
            return protocol_wire::send_deadline(stream, &response, IO_DEADLINE)
                .await
                .map_err(Into::into);
        }
    };

    for record in std::mem::take(&mut subscription.backlog) {
        write_frame(stream, &Response::Log { record: (*record).clone() }).await?;
    }

    let mut transitions = engine.watch_transitions();
    let mut terminal = engine
        .get_job(&job_id)
        .map(|job| job.is_terminal())
        .unwrap_or(true);
    let drain_deadline = tokio::time::Instant::now() + DRAIN_WINDOW;

    loop {
        if terminal {
            // No more appends can happen; deliver what is buffered and
            // finish, bounded by the drain window.
            loop {
                match subscription.rx.try_recv() {
                    Ok(record) => {
                        write_frame(stream, &Response::Log { record: (*record).clone() }).await?;
                    }
                    Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                    Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => break,
                }
                if tokio::time::Instant::now() > drain_deadline {
                    break;
                }
            }
            break;
        }

        tokio::select! {
            record = subscription.rx.recv() => match record {
                Some(record) => {
                    write_frame(stream, &Response::Log { record: (*record).clone() }).await?;
                }
                None => {
                    // Bus closed the channel: overflow or job deletion.
                    if subscription.overflowed.load(Ordering::SeqCst) {
                        write_frame(stream, &Response::Overflow).await?;
                    }
                    break;
                }
            },
            event = transitions.recv() => {
                match event {
                    Ok(event) if event.job_id == job_id && event.to.is_terminal() => {
                        terminal = true;
                    }
                    Ok(_) => {}
                    // Lagged or closed: fall back to polling the job.
                    Err(_) => {
                        terminal = engine
                            .get_job(&job_id)
                            .map(|job| job.is_terminal())
                            .unwrap_or(true);
                    }
                }
            }
        }
    }

    write_frame(stream, &Response::StreamEnd).await?;
    Ok(())
}

/// Stream periodic system metrics until the client disconnects.
pub(super) async fn stream_metrics<S, P, C, IO>(
    engine: &Engine<S, P, C>,
    stream: &mut IO,
) -> Result<(), ConnectionError>
where
    S: SandboxAdapter,
    P: ProcessAdapter,
    C: Clock,
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut rx = engine.metrics().subscribe();
    while let Some(metrics) = rx.recv().await {
        write_frame(stream, &Response::Metrics { metrics }).await?;
    }
    write_frame(stream, &Response::StreamEnd).await?;
    Ok(())
}
