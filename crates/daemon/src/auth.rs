// SPDX-License-Identifier: MIT

//! Principals and the capability checkpoint.
//!
//! Authentication itself is the transport's business (Unix socket peer,
//! TLS client identity); what reaches this layer is an already
//! authenticated principal on the request envelope. This module decides
//! whether that principal may do what the request asks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::protocol::Request;

/// What a principal may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Admin,
}

impl Capability {
    /// Higher capabilities subsume lower ones.
    pub fn satisfies(self, required: Capability) -> bool {
        self >= required
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Read => write!(f, "read"),
            Capability::Write => write!(f, "write"),
            Capability::Admin => write!(f, "admin"),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    pub capabilities: BTreeSet<Capability>,
}

impl Principal {
    pub fn new(name: &str, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            name: name.to_string(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn can(&self, required: Capability) -> bool {
        self.capabilities.iter().any(|cap| cap.satisfies(required))
    }
}

/// Capability each method demands.
pub fn required_capability(request: &Request) -> Capability {
    use Request::*;
    match request {
        Ping
        | GetJob { .. }
        | ListJobs { .. }
        | StreamLogs { .. }
        | StreamMetrics
        | ListRuntimes
        | ListVolumes
        | ListNetworks
        | GetWorkflow { .. }
        | ListWorkflows => Capability::Read,

        SubmitJob { .. }
        | StopJob { .. }
        | DeleteJob { .. }
        | CreateVolume { .. }
        | DeleteVolume { .. }
        | CreateNetwork { .. }
        | DeleteNetwork { .. }
        | SubmitWorkflow { .. }
        | StopWorkflow { .. } => Capability::Write,

        InstallRuntime { .. } | RemoveRuntime { .. } | DeleteAllJobs | Shutdown => {
            Capability::Admin
        }
    }
}

/// The authorization checkpoint: runs before any state mutation.
pub fn authorize(principal: &Principal, request: &Request) -> Result<(), Capability> {
    let required = required_capability(request);
    if principal.can(required) {
        Ok(())
    } else {
        Err(required)
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
