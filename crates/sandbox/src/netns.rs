// SPDX-License-Identifier: MIT

//! Named network namespaces.
//!
//! Namespaces are materialized with the `ip` tool, the same shell-out
//! pattern the engine uses for everything it does not want to speak
//! netlink for. `ip netns add` pins the namespace at `/run/netns/<name>`,
//! which is the file the spawn path setns(2)s into.

use std::path::PathBuf;
use tokio::process::Command;

use crate::subprocess::{run_checked, IP_COMMAND_TIMEOUT};

/// Where `ip netns` pins namespace files.
pub const NETNS_RUN_DIR: &str = "/run/netns";

/// Prefix for engine-owned namespace names, so `ip netns list` output is
/// attributable.
pub const NETNS_PREFIX: &str = "joblet-";

/// Namespace name for an engine network.
pub fn ns_name(network: &str) -> String {
    format!("{NETNS_PREFIX}{network}")
}

/// Path to the pinned namespace file for an engine network.
pub fn ns_path(network: &str) -> PathBuf {
    PathBuf::from(NETNS_RUN_DIR).join(ns_name(network))
}

/// Ensure the namespace for `network` exists, creating it (with loopback
/// up) on first use. Returns the pinned path.
pub async fn ensure_netns(network: &str) -> Result<PathBuf, String> {
    let path = ns_path(network);
    if path.exists() {
        return Ok(path);
    }
    let name = ns_name(network);

    let mut add = Command::new("ip");
    add.args(["netns", "add", &name]);
    run_checked(add, IP_COMMAND_TIMEOUT, "ip netns add").await?;

    let mut lo = Command::new("ip");
    lo.args(["-n", &name, "link", "set", "lo", "up"]);
    run_checked(lo, IP_COMMAND_TIMEOUT, "ip link set lo up").await?;

    tracing::info!(network, ns = %name, "created network namespace");
    Ok(path)
}

/// Ensure the bridge namespace exists with a veth pair into the init
/// namespace. The host side is left unaddressed; address management is the
/// installer's business.
pub async fn ensure_bridge() -> Result<PathBuf, String> {
    let path = ns_path("bridge");
    if path.exists() {
        return Ok(path);
    }
    ensure_netns("bridge").await?;
    let name = ns_name("bridge");

    let mut veth = Command::new("ip");
    veth.args([
        "link", "add", "joblet0", "type", "veth", "peer", "name", "joblet1", "netns", &name,
    ]);
    run_checked(veth, IP_COMMAND_TIMEOUT, "ip link add veth").await?;

    let mut up_host = Command::new("ip");
    up_host.args(["link", "set", "joblet0", "up"]);
    run_checked(up_host, IP_COMMAND_TIMEOUT, "ip link set joblet0 up").await?;

    let mut up_ns = Command::new("ip");
    up_ns.args(["-n", &name, "link", "set", "joblet1", "up"]);
    run_checked(up_ns, IP_COMMAND_TIMEOUT, "ip link set joblet1 up").await?;

    tracing::info!("created bridge namespace with veth pair");
    Ok(path)
}

/// Delete an engine-owned namespace. Best-effort.
pub async fn delete_netns(network: &str) {
    let name = ns_name(network);
    let mut del = Command::new("ip");
    del.args(["netns", "delete", &name]);
    if let Err(e) = run_checked(del, IP_COMMAND_TIMEOUT, "ip netns delete").await {
        tracing::debug!(network, error = %e, "netns delete failed");
    }
}

#[cfg(test)]
#[path = "netns_tests.rs"]
mod tests;
