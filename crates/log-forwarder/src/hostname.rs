// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host identity embedded in object keys

use std::env;
use tracing::warn;

use crate::object_key::sanitize_segment;

pub const HOSTNAME_OVERRIDE_ENV: &str = "FORWARDER_HOSTNAME";

/// Get the host identity used in object keys
///
/// Tried in order:
/// 1. FORWARDER_HOSTNAME environment variable
/// 2. HOSTNAME environment variable
/// 3. System hostname via nix::unistd::gethostname()
/// 4. "unknown"
///
/// Characters outside `[A-Za-z0-9._=-]` are replaced with `_`.
#[must_use]
pub fn get_hostname() -> String {
    if let Some(hostname) = non_empty_env(HOSTNAME_OVERRIDE_ENV) {
        return sanitize(&hostname);
    }

    if let Some(hostname) = non_empty_env("HOSTNAME") {
        return sanitize(&hostname);
    }

    match nix::unistd::gethostname() {
        Ok(hostname) => {
            if let Some(hostname) = hostname.to_str().filter(|h| !h.is_empty()) {
                return sanitize(hostname);
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

// The host is one key segment, anything an object store would rewrite becomes `_`.
fn sanitize(hostname: &str) -> String {
    match sanitize_segment(hostname).as_str() {
        "." | ".." => "unknown".to_string(),
        sanitized => sanitized.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_hostname_not_empty() {
        let hostname = get_hostname();
        assert!(!hostname.is_empty());
    }

    #[test]
    #[serial]
    fn test_hostname_override() {
        env::set_var(HOSTNAME_OVERRIDE_ENV, "forwarder-7");
        let hostname = get_hostname();
        env::remove_var(HOSTNAME_OVERRIDE_ENV);
        assert_eq!(hostname, "forwarder-7");
    }

    #[test]
    #[serial]
    fn test_empty_override_is_ignored() {
        env::set_var(HOSTNAME_OVERRIDE_ENV, "");
        let hostname = get_hostname();
        env::remove_var(HOSTNAME_OVERRIDE_ENV);
        assert!(!hostname.is_empty());
    }

    #[test]
    #[serial]
    fn test_separator_is_replaced() {
        env::set_var(HOSTNAME_OVERRIDE_ENV, "pod/abc");
        let hostname = get_hostname();
        env::remove_var(HOSTNAME_OVERRIDE_ENV);
        assert_eq!(hostname, "pod_abc");
    }

    #[test]
    #[serial]
    fn test_unsafe_characters_are_replaced() {
        env::set_var(HOSTNAME_OVERRIDE_ENV, "host~1 (blue)");
        let hostname = get_hostname();
        env::remove_var(HOSTNAME_OVERRIDE_ENV);
        assert_eq!(hostname, "host_1__blue_");
        assert!(crate::object_key::validate_host(&hostname).is_ok());
    }
}
