// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object key naming.
//!
//! Every flush is written under a fresh key of the form
//!
//! ```text
//! {prefix}/{YYYY}/{MM}/{DD}/{YYYY}{MM}{DD}T{hh}{mm}{ss}.{micros}Z-{host}-{token}.log
//! ```
//!
//! Keys sort by creation time within a day prefix. The 128-bit token comes from
//! the operating system CSPRNG so keys written by many hosts and processes do
//! not collide. If the random source fails, key generation fails; there is no
//! fallback to a weaker generator.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::errors::KeyError;

pub type Token = [u8; 16];

/// Builds the object key for a flush happening at `now`.
///
/// An empty prefix yields a key starting at the year component.
#[must_use]
pub fn make_key(prefix: &str, now: DateTime<Utc>, host: &str, token: &Token) -> String {
    let stamp = now.format("%Y/%m/%d/%Y%m%dT%H%M%S%.6fZ");
    let token = u128::from_be_bytes(*token);
    if prefix.is_empty() {
        format!("{stamp}-{host}-{token:032x}.log")
    } else {
        format!("{prefix}/{stamp}-{host}-{token:032x}.log")
    }
}

/// Source of the per-flush key token.
pub trait TokenSource: Send + Sync + fmt::Debug {
    fn token(&self) -> Result<Token, KeyError>;
}

/// Operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsTokenSource;

impl TokenSource for OsTokenSource {
    fn token(&self) -> Result<Token, KeyError> {
        random_token()
    }
}

/// Draws a fresh token from the operating system random source.
pub fn random_token() -> Result<Token, KeyError> {
    let mut token = Token::default();
    OsRng.try_fill_bytes(&mut token)?;
    Ok(token)
}

/// Strips trailing separators so the prefix joins with exactly one `/`.
#[must_use]
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_end_matches('/').to_string()
}

/// Characters object stores keep verbatim in a key segment.
fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '=')
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && segment.chars().all(is_key_char)
}

/// Checks a normalized prefix. Empty is allowed; otherwise no leading `/`,
/// no empty, `.` or `..` segment, and only `[A-Za-z0-9._=-]`.
pub fn validate_prefix(prefix: &str) -> Result<(), KeyError> {
    if prefix.is_empty() || prefix.split('/').all(is_valid_segment) {
        Ok(())
    } else {
        Err(KeyError::InvalidPrefix(prefix.to_string()))
    }
}

pub fn validate_host(host: &str) -> Result<(), KeyError> {
    if is_valid_segment(host) {
        Ok(())
    } else {
        Err(KeyError::InvalidHost(host.to_string()))
    }
}

/// Replaces every character that cannot appear in a key segment with `_`.
#[must_use]
pub fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| if is_key_char(c) { c } else { '_' })
        .collect()
}

/// Supplies keys for the flusher: fixed prefix and host, current time, fresh token.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
    host: String,
    tokens: Arc<dyn TokenSource>,
}

impl KeyGenerator {
    /// Normalizes the prefix and rejects a prefix or host that an object
    /// store would rewrite, so the key handed to the store is the key stored.
    pub fn new(prefix: &str, host: impl Into<String>) -> Result<Self, KeyError> {
        let prefix = normalize_prefix(prefix);
        let host = host.into();
        validate_prefix(&prefix)?;
        validate_host(&host)?;
        Ok(Self {
            prefix,
            host,
            tokens: Arc::new(OsTokenSource),
        })
    }

    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn next_key(&self) -> Result<String, KeyError> {
        self.key_at(Utc::now())
    }

    pub fn key_at(&self, now: DateTime<Utc>) -> Result<String, KeyError> {
        let token = self.tokens.token()?;
        Ok(make_key(&self.prefix, now, &self.host, &token))
    }
}

/// Token source whose every draw fails.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FailingTokenSource;

#[cfg(test)]
impl TokenSource for FailingTokenSource {
    fn token(&self) -> Result<Token, KeyError> {
        Err(KeyError::RandomSource(rand::Error::new(
            std::io::Error::other("entropy source unavailable"),
        )))
    }
}
