// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Server-side TLS for the intake listener.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::errors::IntakeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PEM private key (PKCS#8, PKCS#1 or SEC1).
    pub key_path: PathBuf,
}

impl TlsConfig {
    pub fn acceptor(&self) -> Result<TlsAcceptor, IntakeError> {
        let certs = load_certs(&self.cert_path)?;
        let key = load_key(&self.key_path)?;
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn open(path: &Path) -> Result<BufReader<File>, IntakeError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| IntakeError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, IntakeError> {
    rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| IntakeError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, IntakeError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| IntakeError::TlsMaterial {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| IntakeError::MissingPrivateKey(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "log-forwarder-tls-{}-{name}",
            std::process::id()
        ));
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        path
    }

    #[test]
    fn test_missing_certificate_file() {
        let config = TlsConfig {
            cert_path: PathBuf::from("/nonexistent/server.crt"),
            key_path: PathBuf::from("/nonexistent/server.key"),
        };
        let error = config.acceptor().err().expect("should fail");
        assert!(matches!(error, IntakeError::TlsMaterial { .. }));
        assert!(error.to_string().contains("/nonexistent/server.crt"));
    }

    #[test]
    fn test_key_file_without_key() {
        let cert = temp_file("empty.crt", "");
        let key = temp_file("empty.key", "not a pem file\n");
        let config = TlsConfig {
            cert_path: cert.clone(),
            key_path: key.clone(),
        };
        let error = config.acceptor().err().expect("should fail");
        assert!(matches!(error, IntakeError::MissingPrivateKey(_)));
        let _ = std::fs::remove_file(cert);
        let _ = std::fs::remove_file(key);
    }
}
