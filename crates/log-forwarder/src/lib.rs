// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffers log payloads received over HTTP and writes them to object storage
//! in batches.
//!
//! Payloads enter through a [`aggregator_service::PayloadSink`], are appended
//! newline terminated to a single in-memory buffer, and the buffer is written
//! as one object whenever it reaches the size threshold, when the flush timer
//! elapses, or on shutdown.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod aggregator_service;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flush_policy;
pub mod flusher;
pub mod hostname;
pub mod intake;
pub mod object_key;
pub mod s3_store;
pub mod storage;
pub mod tls;
