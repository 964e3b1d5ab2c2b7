// SPDX-License-Identifier: MIT

//! TLS acceptor construction from externally provisioned material.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::env::TlsPaths;

/// Errors loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("no certificates in {0}")]
    NoCertificates(String),
    #[error("no private key in {0}")]
    NoKey(String),
    #[error("tls configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

/// Build an acceptor from PEM cert chain + key files.
pub fn load_tls_acceptor(paths: &TlsPaths) -> Result<TlsAcceptor, TlsError> {
    let open = |path: &std::path::Path| {
        File::open(path).map(BufReader::new).map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut open(&paths.cert)?)
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Io {
            path: paths.cert.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(paths.cert.display().to_string()));
    }

    let key = rustls_pemfile::private_key(&mut open(&paths.key)?)
        .map_err(|source| TlsError::Io {
            path: paths.key.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoKey(paths.key.display().to_string()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tests;
