// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Newline-delimited accumulation buffer.
//!
//! The buffer is owned by exactly one task, the aggregator service, and is never
//! shared, so it carries no synchronization of its own.

use bytes::{Bytes, BytesMut};

const NEWLINE: u8 = b'\n';

#[derive(Debug, Default)]
pub struct Aggregator {
    buffer: BytesMut,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends one payload as a record terminated by exactly one newline.
    ///
    /// Returns the buffered size after the append.
    pub fn append(&mut self, payload: &[u8]) -> usize {
        self.buffer.extend_from_slice(payload);
        if payload.last() != Some(&NEWLINE) {
            self.buffer.extend_from_slice(&[NEWLINE]);
        }
        self.buffer.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Copy of the buffered bytes. The buffer itself is left untouched.
    #[must_use]
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer)
    }

    /// Drops the buffered bytes, keeping the allocation for the next batch.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_adds_missing_newline() {
        let mut aggregator = Aggregator::new();
        assert_eq!(aggregator.append(b"hello"), 6);
        assert_eq!(aggregator.as_bytes(), b"hello\n");
    }

    #[test]
    fn test_append_keeps_existing_newline() {
        let mut aggregator = Aggregator::new();
        assert_eq!(aggregator.append(b"hello\n"), 6);
        assert_eq!(aggregator.as_bytes(), b"hello\n");
    }

    #[test]
    fn test_append_only_inspects_last_byte() {
        let mut aggregator = Aggregator::new();
        aggregator.append(b"a\nb");
        aggregator.append(b"c\n\n");
        assert_eq!(aggregator.as_bytes(), b"a\nb\nc\n\n");
    }

    #[test]
    fn test_empty_payload_becomes_empty_record() {
        let mut aggregator = Aggregator::new();
        assert_eq!(aggregator.append(b""), 1);
        assert_eq!(aggregator.as_bytes(), b"\n");
    }

    #[test]
    fn test_records_are_kept_in_order() {
        let mut aggregator = Aggregator::with_capacity(16);
        for payload in [&b"a"[..], b"b", b"c"] {
            aggregator.append(payload);
        }
        assert_eq!(aggregator.as_bytes(), b"a\nb\nc\n");
        assert_eq!(aggregator.len(), 6);
    }

    #[test]
    fn test_snapshot_does_not_drain() {
        let mut aggregator = Aggregator::new();
        aggregator.append(b"payload");
        let snapshot = aggregator.snapshot();
        assert_eq!(&snapshot[..], b"payload\n");
        assert_eq!(aggregator.len(), 8);
    }

    #[test]
    fn test_clear_empties_buffer() {
        let mut aggregator = Aggregator::new();
        aggregator.append(b"payload");
        aggregator.clear();
        assert!(aggregator.is_empty());
        assert_eq!(aggregator.len(), 0);
    }
}
