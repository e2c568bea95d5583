// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::{debug, error};

use crate::aggregator::Aggregator;
use crate::errors::FlushError;
use crate::flush_policy::FlushTrigger;
use crate::object_key::KeyGenerator;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The buffer was empty, nothing was written.
    Skipped,
    Written { key: String, bytes: usize },
}

/// Writes the aggregator buffer out as a single object.
#[derive(Clone)]
pub struct Flusher {
    store: Arc<dyn ObjectStore>,
    keys: KeyGenerator,
}

impl Flusher {
    pub fn new(store: Arc<dyn ObjectStore>, keys: KeyGenerator) -> Self {
        Flusher { store, keys }
    }

    /// Flush the buffer under a fresh key.
    ///
    /// The buffer is cleared only after the store accepted the object. On any
    /// error it is left exactly as it was and the error is returned as is.
    pub async fn flush(
        &self,
        aggregator: &mut Aggregator,
        trigger: FlushTrigger,
    ) -> Result<FlushOutcome, FlushError> {
        if aggregator.is_empty() {
            return Ok(FlushOutcome::Skipped);
        }

        let key = self.keys.next_key()?;
        let bytes = aggregator.len();
        debug!("Flushing {bytes} bytes to {key} ({trigger})");

        if let Err(source) = self.store.put(&key, aggregator.snapshot()).await {
            error!("Failed to put object {key}: {source}");
            return Err(FlushError::Storage { key, source });
        }

        aggregator.clear();
        debug!("Successfully flushed {bytes} bytes to {key}");
        Ok(FlushOutcome::Written { key, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{KeyError, StorageError};
    use crate::object_key::FailingTokenSource;
    use crate::storage::InMemoryStore;

    fn flusher(store: &InMemoryStore) -> Flusher {
        Flusher::new(Arc::new(store.clone()), KeyGenerator::new("logs/", "host-1").expect("valid generator"))
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_is_noop() {
        let store = InMemoryStore::new();
        let mut aggregator = Aggregator::new();

        let outcome = flusher(&store)
            .flush(&mut aggregator, FlushTrigger::TimerElapsed)
            .await
            .expect("flush failed");

        assert_eq!(outcome, FlushOutcome::Skipped);
        assert_eq!(store.attempts(), 0);
        assert!(aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_flush_writes_and_clears() {
        let store = InMemoryStore::new();
        let mut aggregator = Aggregator::new();
        aggregator.append(b"hello");

        let outcome = flusher(&store)
            .flush(&mut aggregator, FlushTrigger::TimerElapsed)
            .await
            .expect("flush failed");

        let objects = store.objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(&objects[0].body[..], b"hello\n");
        assert!(objects[0].key.starts_with("logs/"));
        assert!(objects[0].key.contains("-host-1-"));
        assert_eq!(
            outcome,
            FlushOutcome::Written {
                key: objects[0].key.clone(),
                bytes: 6
            }
        );
        assert!(aggregator.is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_buffer() {
        let store = InMemoryStore::failing();
        let mut aggregator = Aggregator::new();
        aggregator.append(b"a");
        aggregator.append(b"b");

        let result = flusher(&store)
            .flush(&mut aggregator, FlushTrigger::SizeExceeded)
            .await;

        match result {
            Err(FlushError::Storage { key, source }) => {
                assert!(key.starts_with("logs/"));
                assert!(matches!(source, StorageError::Other(_)));
            }
            other => panic!("expected storage error, got {other:?}"),
        }
        assert_eq!(aggregator.as_bytes(), b"a\nb\n");
        assert_eq!(store.attempts(), 1);
    }

    #[tokio::test]
    async fn test_each_flush_uses_a_new_key() {
        let store = InMemoryStore::new();
        let flusher = flusher(&store);
        let mut aggregator = Aggregator::new();

        for payload in [&b"one"[..], b"two"] {
            aggregator.append(payload);
            flusher
                .flush(&mut aggregator, FlushTrigger::SizeExceeded)
                .await
                .expect("flush failed");
        }

        let objects = store.objects();
        assert_eq!(objects.len(), 2);
        assert_ne!(objects[0].key, objects[1].key);
    }

    #[tokio::test]
    async fn test_random_source_failure_skips_store() {
        let store = InMemoryStore::new();
        let keys = KeyGenerator::new("logs", "host-1")
            .expect("valid generator")
            .with_token_source(Arc::new(FailingTokenSource));
        let flusher = Flusher::new(Arc::new(store.clone()), keys);
        let mut aggregator = Aggregator::new();
        aggregator.append(b"keep me");

        let result = flusher
            .flush(&mut aggregator, FlushTrigger::TimerElapsed)
            .await;

        assert!(matches!(
            result,
            Err(FlushError::Key(KeyError::RandomSource(_)))
        ));
        assert_eq!(store.attempts(), 0);
        assert_eq!(aggregator.as_bytes(), b"keep me\n");
    }
}
