// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! When the aggregator writes its buffer out.
//!
//! Two recurring triggers drive a flush while the aggregator is running:
//! - **Size**: the buffered byte count reached the configured threshold
//! - **Timer**: a full flush interval elapsed since the last flush attempt
//!
//! A third, terminal trigger fires once when the payload channel closes and the
//! remaining payloads have been drained.

use std::fmt;
use std::time::Duration;

/// Why a flush was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    SizeExceeded,
    TimerElapsed,
    ShutdownRequested,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeExceeded => write!(f, "size"),
            Self::TimerElapsed => write!(f, "timer"),
            Self::ShutdownRequested => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Interval between flushes, measured from the last flush attempt.
    pub interval: Duration,
    /// Buffered byte count at which a flush happens immediately.
    pub size_threshold: usize,
}

impl FlushPolicy {
    #[must_use]
    pub fn new(interval: Duration, size_threshold: usize) -> Self {
        Self {
            interval,
            size_threshold,
        }
    }

    /// Evaluated after every append.
    #[must_use]
    pub fn on_append(&self, buffered: usize) -> Option<FlushTrigger> {
        (buffered >= self.size_threshold).then_some(FlushTrigger::SizeExceeded)
    }

    /// Evaluated when the interval timer fires. An empty buffer only restarts
    /// the timer, so idle periods do not produce zero-byte objects.
    #[must_use]
    pub fn on_timer(&self, buffered: usize) -> Option<FlushTrigger> {
        (buffered > 0).then_some(FlushTrigger::TimerElapsed)
    }

    /// Evaluated once after the channel has been drained.
    #[must_use]
    pub fn on_shutdown(&self, buffered: usize) -> Option<FlushTrigger> {
        (buffered > 0).then_some(FlushTrigger::ShutdownRequested)
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(crate::constants::DEFAULT_FLUSH_PERIOD_SECS),
            crate::constants::DEFAULT_CACHE_SIZE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(threshold: usize) -> FlushPolicy {
        FlushPolicy::new(Duration::from_secs(30), threshold)
    }

    #[test]
    fn test_size_trigger_fires_at_threshold_not_before() {
        let policy = policy(4096);
        assert_eq!(policy.on_append(0), None);
        assert_eq!(policy.on_append(4095), None);
        assert_eq!(policy.on_append(4096), Some(FlushTrigger::SizeExceeded));
        assert_eq!(policy.on_append(5001), Some(FlushTrigger::SizeExceeded));
    }

    #[test]
    fn test_timer_skips_empty_buffer() {
        let policy = policy(4096);
        assert_eq!(policy.on_timer(0), None);
        assert_eq!(policy.on_timer(1), Some(FlushTrigger::TimerElapsed));
    }

    #[test]
    fn test_shutdown_skips_empty_buffer() {
        let policy = policy(4096);
        assert_eq!(policy.on_shutdown(0), None);
        assert_eq!(policy.on_shutdown(6), Some(FlushTrigger::ShutdownRequested));
    }

    #[test]
    fn test_default_policy() {
        let policy = FlushPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(30));
        assert_eq!(policy.size_threshold, 4096);
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(FlushTrigger::SizeExceeded.to_string(), "size");
        assert_eq!(FlushTrigger::TimerElapsed.to_string(), "timer");
        assert_eq!(FlushTrigger::ShutdownRequested.to_string(), "shutdown");
    }
}
