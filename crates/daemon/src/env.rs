// SPDX-License-Identifier: MIT

//! Daemon configuration from environment variables.
//!
//! The engine consumes: `JOBLET_STATE_DIR`, `JOBLET_LISTEN_ADDR`,
//! `JOBLET_TLS_CERT`, `JOBLET_TLS_KEY`, `JOBLET_LOG_LEVEL`,
//! `JOBLET_WORKERS`. Everything else (config files, TLS provisioning) is
//! an external collaborator's job.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JOBLET_LISTEN_ADDR: {0}")]
    InvalidListenAddr(String),
    #[error("invalid JOBLET_WORKERS: {0}")]
    InvalidWorkers(String),
    #[error("JOBLET_TLS_CERT and JOBLET_TLS_KEY must be set together")]
    PartialTls,
    #[error("TLS material not found: {0}")]
    TlsMaterialMissing(PathBuf),
    #[error("non-loopback JOBLET_LISTEN_ADDR requires TLS material")]
    PlaintextRemote,
    #[error("no home directory and no JOBLET_STATE_DIR")]
    NoStateDir,
}

/// TLS material paths, provisioned externally.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Root state directory.
    pub state_dir: PathBuf,
    /// Optional TCP listener address (Unix socket is always served).
    pub listen_addr: Option<SocketAddr>,
    pub tls: Option<TlsPaths>,
    /// env-filter directive for logging.
    pub log_level: String,
    /// Worker parallelism override; defaults to the host's core count.
    pub workers: Option<usize>,
}

impl DaemonConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary lookup (tests inject maps here).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let state_dir = match get("JOBLET_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::state_dir()
                .or_else(dirs::home_dir)
                .map(|base| base.join("joblet"))
                .ok_or(ConfigError::NoStateDir)?,
        };

        let listen_addr = get("JOBLET_LISTEN_ADDR")
            .map(|raw| {
                raw.parse::<SocketAddr>()
                    .map_err(|_| ConfigError::InvalidListenAddr(raw))
            })
            .transpose()?;

        let tls = match (get("JOBLET_TLS_CERT"), get("JOBLET_TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        // Serving plaintext beyond loopback is a misconfiguration, not a
        // choice.
        if let Some(addr) = &listen_addr {
            if !addr.ip().is_loopback() && tls.is_none() {
                return Err(ConfigError::PlaintextRemote);
            }
        }

        let workers = get("JOBLET_WORKERS")
            .map(|raw| {
                raw.parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::InvalidWorkers(raw))
            })
            .transpose()?;

        Ok(Self {
            state_dir,
            listen_addr,
            tls,
            log_level: get("JOBLET_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            workers,
        })
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("jobletd.sock")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("jobletd.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("daemon.log")
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
