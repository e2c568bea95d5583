// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Storage port used by the flusher.
//!
//! The core only needs a single operation, writing a whole object under a key.
//! Implementations:
//! - [`crate::s3_store::S3Store`]: production, backed by `object_store`
//! - [`InMemoryStore`]: tests, records every put in order

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};

use crate::errors::StorageError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `body` as one object under `key`, with content type `text/plain`
    /// and content encoding `utf-8`. Errors are not retried by the caller.
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct InMemoryState {
    objects: Vec<StoredObject>,
    attempts: usize,
    failing: bool,
}

/// Object store that keeps every put in memory.
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// aggregator.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose puts fail until [`InMemoryStore::set_failing`] is called with `false`.
    #[must_use]
    pub fn failing() -> Self {
        let store = Self::new();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Objects written so far, in write order.
    #[must_use]
    pub fn objects(&self) -> Vec<StoredObject> {
        self.lock().objects.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    /// Number of put calls, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Bodies of all stored objects joined in write order.
    #[must_use]
    pub fn concatenated(&self) -> Vec<u8> {
        self.lock()
            .objects
            .iter()
            .flat_map(|object| object.body.iter().copied())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        // A panic while holding the lock leaves plain data behind, keep using it.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.attempts += 1;
        if state.failing {
            return Err(StorageError::Other(format!(
                "in-memory store refused {key}"
            )));
        }
        state.objects.push(StoredObject {
            key: key.to_string(),
            body,
        });
        Ok(())
    }
}
