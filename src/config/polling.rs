// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eurotherm project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling cadence, retry policy and trigger delays

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds on how long a polling loop keeps re-attempting after failures.
///
/// Failures are counted consecutively; any successful poll resets the count
/// and the window. Setting both limits to `None` makes the loops retry until
/// the instrument answers again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of consecutive failed attempts tolerated. The next failure
    /// ends the loop with `RetriesExhausted`.
    pub max_consecutive_failures: Option<u32>,

    /// Longest time in milliseconds a run of consecutive failures may last.
    pub max_failure_window_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: Some(100),
            max_failure_window_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Policy that never gives up.
    pub fn unbounded() -> Self {
        Self {
            max_consecutive_failures: None,
            max_failure_window_ms: None,
        }
    }

    /// Whether a run of `failures` failed attempts lasting `elapsed` is over budget.
    pub fn is_exhausted(&self, failures: u32, elapsed: Duration) -> bool {
        let over_count = self
            .max_consecutive_failures
            .is_some_and(|max| failures > max);
        let over_window = self
            .max_failure_window_ms
            .is_some_and(|max| elapsed > Duration::from_millis(max));
        over_count || over_window
    }
}

/// Cadence of the ramp and status loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Pause between two ramp polls while the goal is not met.
    pub poll_interval_ms: u64,

    /// Pause between two reads of the IR status flag.
    pub status_interval_ms: u64,

    /// Retry policy for transient read failures.
    pub retry: RetryPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            status_interval_ms: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

/// Delays bracketing the remote trigger writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Wait after switching the MS relay, so the sequence can start or stop.
    pub sequence_delay_ms: u64,

    /// Width of the IR acquisition pulse.
    pub pulse_delay_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            sequence_delay_ms: 10_000,
            pulse_delay_ms: 1_000,
        }
    }
}

impl TriggerConfig {
    pub fn sequence_delay(&self) -> Duration {
        Duration::from_millis(self.sequence_delay_ms)
    }

    pub fn pulse_delay(&self) -> Duration {
        Duration::from_millis(self.pulse_delay_ms)
    }
}
