// SPDX-License-Identifier: MIT

//! Frame codec for the RPC socket.
//!
//! Every message travels as one frame: a 4-byte big-endian payload
//! length followed by that many bytes of JSON. Frames are buffered
//! whole; the size cap exists because submissions carry upload blobs and
//! a corrupt length prefix must not talk us into allocating gigabytes.
//! The request/response halves of a connection run under a deadline;
//! streaming frames are written without one, since a stalled subscriber
//! is the log bus's problem, not the socket's.

use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Deadline for the request/response halves of a connection.
pub const IO_DEADLINE: Duration = Duration::from_secs(5);

/// Daemon version, reported on Ping.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Frame codec failures.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("peer closed the connection")]
    Closed,
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte cap")]
    Oversize(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("io deadline elapsed")]
    Deadline,
    #[error(transparent)]
    Io(std::io::Error),
}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        // EOF anywhere in a frame means the peer went away; everything
        // else is a transport fault worth surfacing as-is.
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::Closed
        } else {
            WireError::Io(e)
        }
    }
}

/// Send one message as a frame: header and payload in a single write.
pub async fn send<W, T>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(WireError::Oversize(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive one message.
pub async fn recv<R, T>(reader: &mut R) -> Result<T, WireError>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WireError::Oversize(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// [`send`] under the connection deadline.
pub async fn send_deadline<W, T>(
    writer: &mut W,
    message: &T,
    deadline: Duration,
) -> Result<(), WireError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize + ?Sized,
{
    tokio::time::timeout(deadline, send(writer, message))
        .await
        .map_err(|_| WireError::Deadline)?
}

/// [`recv`] under the connection deadline.
pub async fn recv_deadline<R, T>(reader: &mut R, deadline: Duration) -> Result<T, WireError>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    tokio::time::timeout(deadline, recv(reader))
        .await
        .map_err(|_| WireError::Deadline)?
}

#[cfg(test)]
#[path = "protocol_wire_tests.rs"]
mod tests;
