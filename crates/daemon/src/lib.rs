// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! joblet-daemon: the RPC surface over the execution engine.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON. Every request
//! arrives wrapped in an envelope naming the authenticated principal;
//! the listener authorizes against the method's required capability
//! before touching the engine. Streaming methods keep the connection
//! open and write one frame per record.

pub mod auth;
pub mod env;
pub mod listener;
pub mod protocol;
pub mod protocol_types;
pub mod protocol_wire;

#[cfg(target_os = "linux")]
pub mod lifecycle;
