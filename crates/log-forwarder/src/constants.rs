// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::{IpAddr, Ipv4Addr};

pub const DEFAULT_FLUSH_PERIOD_SECS: u64 = 30;
pub const DEFAULT_CACHE_SIZE: usize = 4096;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 2048;

// Upper bounds accepted from configuration.
pub const MAX_FLUSH_PERIOD_SECS: u64 = 24 * 60 * 60;
// 1GB
pub const MAX_CACHE_SIZE: usize = 1024 * 1024 * 1024;
pub const MAX_CHANNEL_CAPACITY: usize = 1 << 20;
// 1GB
pub const MAX_PAYLOAD_LIMIT: usize = 1024 * 1024 * 1024;

/// The buffer never preallocates more than this, it grows past it on demand.
pub const MAX_INITIAL_BUFFER_CAPACITY: usize = 1024 * 1024;

pub const DEFAULT_LISTEN_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_LISTEN_PORT: u16 = 4443;
// 10MB
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_TLS_CERT_PATH: &str = "server.crt";
pub const DEFAULT_TLS_KEY_PATH: &str = "server.key";

/// Attributes attached to every flushed object.
pub const OBJECT_CONTENT_TYPE: &str = "text/plain";
pub const OBJECT_CONTENT_ENCODING: &str = "utf-8";
