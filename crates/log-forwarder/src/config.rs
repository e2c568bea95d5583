// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_SIZE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_FLUSH_PERIOD_SECS,
    DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_TLS_CERT_PATH,
    DEFAULT_TLS_KEY_PATH, MAX_CACHE_SIZE, MAX_CHANNEL_CAPACITY, MAX_FLUSH_PERIOD_SECS,
    MAX_PAYLOAD_LIMIT,
};
use crate::errors::ConfigError;
use crate::flush_policy::FlushPolicy;
use crate::intake::{IntakeConfig, TlsConfig};
use crate::object_key::{normalize_prefix, validate_prefix};
use crate::s3_store::S3Config;

pub const BUCKET_NAME_ENV: &str = "FORWARDER_BUCKET_NAME";
pub const REGION_ENV: &str = "FORWARDER_REGION";
pub const AWS_REGION_ENV: &str = "AWS_REGION";
pub const KEY_PREFIX_ENV: &str = "FORWARDER_KEY_PREFIX";
pub const FLUSH_PERIOD_ENV: &str = "FORWARDER_FLUSH_PERIOD_SECS";
pub const CACHE_SIZE_ENV: &str = "FORWARDER_CACHE_SIZE";
pub const CHANNEL_CAPACITY_ENV: &str = "FORWARDER_CHANNEL_CAPACITY";
pub const LISTEN_ADDRESS_ENV: &str = "FORWARDER_LISTEN_ADDRESS";
pub const LISTEN_PORT_ENV: &str = "FORWARDER_LISTEN_PORT";
pub const MAX_PAYLOAD_BYTES_ENV: &str = "FORWARDER_MAX_PAYLOAD_BYTES";
pub const HTTPS_ENV: &str = "FORWARDER_HTTPS";
pub const TLS_CERT_ENV: &str = "FORWARDER_TLS_CERT";
pub const TLS_KEY_ENV: &str = "FORWARDER_TLS_KEY";
pub const S3_ENDPOINT_ENV: &str = "FORWARDER_S3_ENDPOINT";
pub const VERBOSE_ENV: &str = "FORWARDER_VERBOSE";
pub const LOG_LEVEL_ENV: &str = "FORWARDER_LOG_LEVEL";

#[derive(Debug, Clone)]
pub struct Config {
    pub bucket_name: String,
    pub region: String,
    /// Trailing `/` already stripped.
    pub key_prefix: String,
    pub flush_period: Duration,
    /// Size threshold in bytes.
    pub cache_size: usize,
    pub channel_capacity: usize,
    pub listen_address: IpAddr,
    pub listen_port: u16,
    pub max_payload_bytes: usize,
    pub https: bool,
    pub tls_cert_path: PathBuf,
    pub tls_key_path: PathBuf,
    pub s3_endpoint: Option<String>,
    pub verbose: bool,
    pub log_level: String,
}

impl Config {
    /// Reads and validates the configuration from the environment.
    pub fn new() -> Result<Config, ConfigError> {
        let bucket_name =
            non_empty_env(BUCKET_NAME_ENV).ok_or(ConfigError::MissingBucket(BUCKET_NAME_ENV))?;
        let region = non_empty_env(REGION_ENV)
            .or_else(|| non_empty_env(AWS_REGION_ENV))
            .ok_or(ConfigError::MissingRegion(REGION_ENV, AWS_REGION_ENV))?;

        let raw_prefix = env::var(KEY_PREFIX_ENV).unwrap_or_default();
        let key_prefix = normalize_prefix(&raw_prefix);
        validate_prefix(&key_prefix).map_err(|_| ConfigError::Invalid {
            name: KEY_PREFIX_ENV,
            value: raw_prefix,
        })?;
        let flush_period = seconds_env(
            FLUSH_PERIOD_ENV,
            Duration::from_secs(DEFAULT_FLUSH_PERIOD_SECS),
            MAX_FLUSH_PERIOD_SECS,
        )?;
        let cache_size = bounded_env(CACHE_SIZE_ENV, DEFAULT_CACHE_SIZE, MAX_CACHE_SIZE)?;
        let channel_capacity =
            bounded_env(CHANNEL_CAPACITY_ENV, DEFAULT_CHANNEL_CAPACITY, MAX_CHANNEL_CAPACITY)?;
        let max_payload_bytes =
            bounded_env(MAX_PAYLOAD_BYTES_ENV, DEFAULT_MAX_PAYLOAD_BYTES, MAX_PAYLOAD_LIMIT)?;

        let listen_address = parse_env(LISTEN_ADDRESS_ENV)?.unwrap_or(DEFAULT_LISTEN_ADDRESS);
        let listen_port = parse_env(LISTEN_PORT_ENV)?.unwrap_or(DEFAULT_LISTEN_PORT);

        let verbose = bool_env(VERBOSE_ENV)?;
        let log_level = non_empty_env(LOG_LEVEL_ENV)
            .map(|level| level.to_lowercase())
            .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());

        Ok(Config {
            bucket_name,
            region,
            key_prefix,
            flush_period,
            cache_size,
            channel_capacity,
            listen_address,
            listen_port,
            max_payload_bytes,
            https: bool_env(HTTPS_ENV)?,
            tls_cert_path: non_empty_env(TLS_CERT_ENV)
                .unwrap_or_else(|| DEFAULT_TLS_CERT_PATH.to_string())
                .into(),
            tls_key_path: non_empty_env(TLS_KEY_ENV)
                .unwrap_or_else(|| DEFAULT_TLS_KEY_PATH.to_string())
                .into(),
            s3_endpoint: non_empty_env(S3_ENDPOINT_ENV),
            verbose,
            log_level,
        })
    }

    #[must_use]
    pub fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::new(self.flush_period, self.cache_size)
    }

    #[must_use]
    pub fn s3_config(&self) -> S3Config {
        S3Config {
            bucket: self.bucket_name.clone(),
            region: self.region.clone(),
            endpoint: self.s3_endpoint.clone(),
        }
    }

    #[must_use]
    pub fn intake_config(&self) -> IntakeConfig {
        IntakeConfig {
            addr: SocketAddr::new(self.listen_address, self.listen_port),
            max_payload_bytes: self.max_payload_bytes,
            tls: self.https.then(|| TlsConfig {
                cert_path: self.tls_cert_path.clone(),
                key_path: self.tls_key_path.clone(),
            }),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    non_empty_env(name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { name, value })
        })
        .transpose()
}

/// Positive integer no larger than `max`.
fn bounded_env(name: &'static str, default: usize, max: usize) -> Result<usize, ConfigError> {
    let Some(value) = non_empty_env(name) else {
        return Ok(default);
    };
    match value.parse::<i64>() {
        Ok(parsed) if parsed <= 0 => Err(ConfigError::NotPositive { name, value }),
        Ok(parsed) => match usize::try_from(parsed) {
            Ok(parsed) if parsed <= max => Ok(parsed),
            _ => Err(ConfigError::TooLarge {
                name,
                value,
                max: max as u64,
            }),
        },
        Err(_) => Err(ConfigError::Invalid { name, value }),
    }
}

/// Positive number of seconds, integer or fractional, no larger than `max_secs`.
fn seconds_env(
    name: &'static str,
    default: Duration,
    max_secs: u64,
) -> Result<Duration, ConfigError> {
    let Some(value) = non_empty_env(name) else {
        return Ok(default);
    };
    match value.parse::<f64>() {
        Ok(secs) if secs.is_nan() => Err(ConfigError::Invalid { name, value }),
        Ok(secs) if secs <= 0.0 => Err(ConfigError::NotPositive { name, value }),
        Ok(secs) if secs > max_secs as f64 => Err(ConfigError::TooLarge {
            name,
            value,
            max: max_secs,
        }),
        Ok(secs) => match Duration::from_secs_f64(secs) {
            period if period.is_zero() => Err(ConfigError::NotPositive { name, value }),
            period => Ok(period),
        },
        Err(_) => Err(ConfigError::Invalid { name, value }),
    }
}

fn bool_env(name: &'static str) -> Result<bool, ConfigError> {
    match non_empty_env(name).map(|value| value.to_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { name, value }),
        },
    }
}
