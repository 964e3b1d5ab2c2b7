// SPDX-License-Identifier: MIT

//! Named networks jobs can attach to.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Joins the init network namespace.
pub const HOST_NETWORK: &str = "host";
/// Joins the engine's pre-created veth-pair namespace.
pub const BRIDGE_NETWORK: &str = "bridge";

/// Errors from network operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),
    #[error("network already exists: {0}")]
    DuplicateName(String),
    #[error("network not found: {0}")]
    NotFound(String),
    #[error("network in use: {0}")]
    InUse(String),
    #[error("built-in network cannot be deleted: {0}")]
    Builtin(String),
}

/// A named network namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    pub in_use: u32,
    /// `host` and `bridge` are built in and undeletable.
    pub builtin: bool,
}

impl Network {
    pub fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cidr: None,
            in_use: 0,
            builtin: true,
        }
    }

    pub fn named(name: &str, cidr: &str) -> Result<Self, NetworkError> {
        validate_cidr(cidr)?;
        Ok(Self {
            name: name.to_string(),
            cidr: Some(cidr.to_string()),
            in_use: 0,
            builtin: false,
        })
    }
}

/// Validate an IPv4 CIDR like `10.1.0.0/24`.
pub fn validate_cidr(cidr: &str) -> Result<(), NetworkError> {
    let err = || NetworkError::InvalidCidr(cidr.to_string());
    let (addr, prefix) = cidr.split_once('/').ok_or_else(err)?;
    addr.parse::<Ipv4Addr>().map_err(|_| err())?;
    let prefix: u8 = prefix.parse().map_err(|_| err())?;
    if prefix > 32 {
        return Err(err());
    }
    Ok(())
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
