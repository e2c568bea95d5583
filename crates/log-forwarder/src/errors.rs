// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for every stage of the forwarder.

use bytes::Bytes;

use crate::flush_policy::FlushTrigger;

/// Startup configuration problems. All of them are fatal before any traffic is served.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no bucket name specified, set {0}")]
    MissingBucket(&'static str),

    #[error("no bucket region specified, set {0} or {1}")]
    MissingRegion(&'static str, &'static str),

    #[error("{name} must be positive, got {value:?}")]
    NotPositive { name: &'static str, value: String },

    #[error("{name} must be at most {max}, got {value:?}")]
    TooLarge {
        name: &'static str,
        value: String,
        max: u64,
    },

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The random source could not produce a token.
    #[error("failed to read random generator: {0}")]
    RandomSource(#[from] rand::Error),

    #[error("invalid key prefix {0:?}: segments must be non-empty and use only [A-Za-z0-9._=-]")]
    InvalidPrefix(String),

    #[error("invalid host {0:?}: must be a single segment using only [A-Za-z0-9._=-]")]
    InvalidHost(String),
}

/// Failure reported by a storage backend. Never retried by the core.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store rejected put: {0}")]
    Backend(#[from] object_store::Error),

    #[error("invalid object key: {0}")]
    InvalidKey(#[from] object_store::path::Error),

    #[error("object key {key:?} would be stored as {stored:?}")]
    KeyRewritten { key: String, stored: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("failed to put object {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: StorageError,
    },
}

/// Terminal failure of the aggregator task.
///
/// The buffer was not cleared, `unflushed` holds exactly the bytes that were
/// buffered when the flush failed so the caller can decide what to do with them.
#[derive(Debug, thiserror::Error)]
#[error("{trigger} flush of {} buffered bytes failed: {source}", .unflushed.len())]
pub struct AggregatorError {
    pub trigger: FlushTrigger,
    pub unflushed: Bytes,
    #[source]
    pub source: FlushError,
}

/// Returned by [`crate::aggregator_service::PayloadSink::submit`] once the
/// aggregator has stopped accepting payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("payload sink is closed")]
pub struct Closed;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read TLS material {path}: {source}")]
    TlsMaterial {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no private key found in {0}")]
    MissingPrivateKey(std::path::PathBuf),

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::MissingBucket("FORWARDER_BUCKET_NAME");
        assert_eq!(
            error.to_string(),
            "no bucket name specified, set FORWARDER_BUCKET_NAME"
        );

        let error = ConfigError::NotPositive {
            name: "FORWARDER_CACHE_SIZE",
            value: "0".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "FORWARDER_CACHE_SIZE must be positive, got \"0\""
        );
    }

    #[test]
    fn test_aggregator_error_reports_unflushed_size() {
        let error = AggregatorError {
            trigger: FlushTrigger::TimerElapsed,
            unflushed: Bytes::from_static(b"hello\n"),
            source: FlushError::Storage {
                key: "logs/k.log".to_string(),
                source: StorageError::Other("boom".to_string()),
            },
        };
        assert_eq!(
            error.to_string(),
            "timer flush of 6 buffered bytes failed: failed to put object logs/k.log: boom"
        );
    }
}
