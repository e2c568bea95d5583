// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-consumer aggregation service.
//!
//! ```text
//!    ┌──────────────┐
//!    │ PayloadSink  │ (one clone per producer)
//!    └──────┬───────┘
//!           │ bounded mpsc channel
//!           v
//!    ┌──────────────┐
//!    │   Service    │ owns buffer + interval timer
//!    └──────┬───────┘
//!           │ at most one flush in flight
//!           v
//!    ┌──────────────┐
//!    │   Flusher    │ ──> ObjectStore::put
//!    └──────────────┘
//! ```
//!
//! The service waits on two events, payload arrival and timer expiry. A payload
//! is appended and flushed right away once the buffer reaches the size
//! threshold. The timer flushes a non-empty buffer and is restarted after every
//! expiry and every flush, so the interval counts from the last flush.
//!
//! # Shutdown
//!
//! The service drains when either every [`PayloadSink`] has been dropped or the
//! cancellation token is cancelled. Remaining queued payloads are appended in
//! order, one final flush covers whatever is buffered, and [`AggregatorService::run`]
//! returns. A failed flush also ends the run; the error carries the unflushed bytes.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator::Aggregator;
use crate::constants::{MAX_CHANNEL_CAPACITY, MAX_INITIAL_BUFFER_CAPACITY};
use crate::errors::{AggregatorError, Closed};
use crate::flush_policy::{FlushPolicy, FlushTrigger};
use crate::flusher::{FlushOutcome, Flusher};

/// Producer side of the payload channel.
///
/// Cheap to clone. When the channel is full, [`PayloadSink::submit`] waits for
/// room instead of dropping the payload.
#[derive(Clone, Debug)]
pub struct PayloadSink {
    tx: mpsc::Sender<Bytes>,
}

impl PayloadSink {
    /// Hands one payload to the aggregator and returns its size in bytes.
    pub async fn submit(&self, payload: Bytes) -> Result<usize, Closed> {
        let size = payload.len();
        self.tx.send(payload).await.map_err(|_| Closed)?;
        Ok(size)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Totals reported when the service terminates cleanly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub payloads: usize,
    pub flushes: usize,
    pub bytes: usize,
}

pub struct AggregatorService {
    aggregator: Aggregator,
    policy: FlushPolicy,
    flusher: Flusher,
    rx: mpsc::Receiver<Bytes>,
    cancel_token: CancellationToken,
    summary: FlushSummary,
}

impl AggregatorService {
    /// Creates the service and the sink feeding it.
    ///
    /// `channel_capacity` bounds the number of payloads queued between
    /// producers and the service. It is clamped to
    /// `1..=MAX_CHANNEL_CAPACITY`; the buffer preallocates at most
    /// `MAX_INITIAL_BUFFER_CAPACITY` bytes whatever the size threshold.
    #[must_use]
    pub fn new(
        policy: FlushPolicy,
        flusher: Flusher,
        channel_capacity: usize,
    ) -> (Self, PayloadSink) {
        let (tx, rx) = mpsc::channel(channel_capacity.clamp(1, MAX_CHANNEL_CAPACITY));
        let service = Self {
            aggregator: Aggregator::with_capacity(
                policy.size_threshold.min(MAX_INITIAL_BUFFER_CAPACITY),
            ),
            policy,
            flusher,
            rx,
            cancel_token: CancellationToken::new(),
            summary: FlushSummary::default(),
        };
        (service, PayloadSink { tx })
    }

    /// Token that starts the drain when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Runs until the channel closes or the token is cancelled, then drains.
    pub async fn run(mut self) -> Result<FlushSummary, AggregatorError> {
        let interval = self.policy.interval;
        debug!(
            "Aggregator service started: flush interval {:?}, size threshold {} bytes",
            interval, self.policy.size_threshold
        );

        let timer = sleep(interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!("Aggregator service received shutdown signal, draining remaining payloads");
                    self.rx.close();
                    break;
                }

                () = &mut timer => {
                    if let Some(trigger) = self.policy.on_timer(self.aggregator.len()) {
                        self.flush(trigger).await?;
                    }
                    timer.as_mut().reset(Instant::now() + interval);
                }

                payload = self.rx.recv() => {
                    let Some(payload) = payload else {
                        debug!("Payload channel closed, draining");
                        break;
                    };
                    if self.ingest(&payload).await? {
                        timer.as_mut().reset(Instant::now() + interval);
                    }
                }
            }
        }

        while let Some(payload) = self.rx.recv().await {
            self.ingest(&payload).await?;
        }
        if let Some(trigger) = self.policy.on_shutdown(self.aggregator.len()) {
            self.flush(trigger).await?;
        }

        info!(
            "Aggregator service stopped after {} payloads, {} flushes, {} bytes",
            self.summary.payloads, self.summary.flushes, self.summary.bytes
        );
        Ok(self.summary)
    }

    /// Appends one payload and flushes if it filled the buffer.
    /// Returns whether a flush happened.
    async fn ingest(&mut self, payload: &[u8]) -> Result<bool, AggregatorError> {
        self.summary.payloads += 1;
        let buffered = self.aggregator.append(payload);
        match self.policy.on_append(buffered) {
            Some(trigger) => {
                self.flush(trigger).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn flush(&mut self, trigger: FlushTrigger) -> Result<(), AggregatorError> {
        match self.flusher.flush(&mut self.aggregator, trigger).await {
            Ok(FlushOutcome::Written { bytes, .. }) => {
                self.summary.flushes += 1;
                self.summary.bytes += bytes;
                Ok(())
            }
            Ok(FlushOutcome::Skipped) => Ok(()),
            Err(source) => {
                error!(
                    "{trigger} flush failed, {} bytes left unflushed",
                    self.aggregator.len()
                );
                Err(AggregatorError {
                    trigger,
                    unflushed: self.aggregator.snapshot(),
                    source,
                })
            }
        }
    }
}
