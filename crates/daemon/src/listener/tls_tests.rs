// SPDX-License-Identifier: MIT

use super::*;
use crate::env::TlsPaths;

fn paths(dir: &std::path::Path) -> TlsPaths {
    TlsPaths {
        cert: dir.join("cert.pem"),
        key: dir.join("key.pem"),
    }
}

#[test]
fn missing_files_are_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_tls_acceptor(&paths(dir.path())).err().unwrap();
    assert!(matches!(err, TlsError::Io { .. }));
}

#[test]
fn empty_cert_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());
    std::fs::write(&p.cert, "").unwrap();
    std::fs::write(&p.key, "").unwrap();
    let err = load_tls_acceptor(&p).err().unwrap();
    assert!(matches!(err, TlsError::NoCertificates(_)));
}

#[test]
fn cert_without_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let p = paths(dir.path());
    // A syntactically valid but empty-keyed setup: certificate PEM with
    // no private key in the key file.
    std::fs::write(
        &p.cert,
        "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIUfake\n-----END CERTIFICATE-----\n",
    )
    .unwrap();
    std::fs::write(&p.key, "not a key").unwrap();
    let err = load_tls_acceptor(&p).err().unwrap();
    assert!(matches!(err, TlsError::NoKey(_) | TlsError::Io { .. }));
}
