//! # Rate Estimation
//!
//! Sliding-window throughput estimation over sparse boolean trigger events.
//!
//! A sensor reports `true` each time an item passes. [`RateEstimator`] keeps
//! the trigger timestamps of the last [`RateConfig::horizon_ms`] and turns the
//! spacing between them into an items/second rate, ignoring the first
//! [`RateConfig::warmup_samples`] retained samples.

use crate::primitives::{DEFAULT_WARMUP_SAMPLES, MS_PER_SECOND, RATE_WINDOW_HORIZON_MS};
use crate::{LineError, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Window parameters for a [`RateEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Lookback in milliseconds.
    pub horizon_ms: i64,
    /// Retained samples discarded before averaging.
    pub warmup_samples: usize,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            horizon_ms: RATE_WINDOW_HORIZON_MS,
            warmup_samples: DEFAULT_WARMUP_SAMPLES,
        }
    }
}

impl RateConfig {
    /// Reject a non-positive horizon.
    pub fn validate(&self) -> Result<(), LineError> {
        if self.horizon_ms <= 0 {
            return Err(LineError::InvalidConfig(format!(
                "rate horizon must be positive, got {} ms",
                self.horizon_ms
            )));
        }
        Ok(())
    }

    /// Index of the sample the first counted interval starts from.
    ///
    /// Intervals `t[i] - t[i-1]` are summed for `i >= max(warmup, 1)`.
    fn first_interval_start(&self) -> usize {
        self.warmup_samples.max(1) - 1
    }

    /// Samples needed before a rate is available (4 with the default warm-up).
    #[must_use]
    pub fn min_samples(&self) -> usize {
        self.warmup_samples.max(1) + 1
    }
}

// =============================================================================
// RATE ESTIMATOR
// =============================================================================

/// Instantaneous items/second estimate over a time-bounded window.
///
/// The window holds trigger timestamps oldest-first. Timestamps must arrive
/// in non-decreasing order; a sample older than the newest retained one is
/// dropped so the window stays sorted.
#[derive(Debug, Clone, Default)]
pub struct RateEstimator {
    config: RateConfig,
    window: VecDeque<Timestamp>,
}

impl RateEstimator {
    /// Create an estimator with the given window parameters.
    #[must_use]
    pub fn new(config: RateConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
        }
    }

    /// Window parameters in use.
    #[must_use]
    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Feed one sensor sample.
    ///
    /// Non-triggered samples are ignored. A trigger first evicts every
    /// retained timestamp older than `timestamp - horizon`, then appends.
    pub fn on_sample(&mut self, timestamp: Timestamp, triggered: bool) {
        if !triggered {
            return;
        }

        if self.window.back().is_some_and(|&last| timestamp < last) {
            tracing::debug!(
                timestamp,
                "dropping out-of-order trigger older than the newest sample"
            );
            return;
        }

        let cutoff = timestamp.saturating_sub(self.config.horizon_ms);
        while self.window.front().is_some_and(|&t| t < cutoff) {
            self.window.pop_front();
        }

        self.window.push_back(timestamp);
    }

    /// Current rate in items per second.
    ///
    /// `None` while fewer than [`RateConfig::min_samples`] samples are retained,
    /// or when every counted interval is zero.
    #[must_use]
    pub fn current_rate(&self) -> Option<f64> {
        if self.window.len() < self.config.min_samples() {
            return None;
        }

        let start = self.config.first_interval_start();
        let first = *self.window.get(start)?;
        let last = *self.window.back()?;
        let intervals = self.window.len() - start - 1;

        let average = (last - first) as f64 / intervals as f64;
        if average <= 0.0 {
            return None;
        }
        Some(MS_PER_SECOND / average)
    }

    /// Like [`current_rate`](Self::current_rate), but reports why no rate exists.
    pub fn rate(&self) -> Result<f64, LineError> {
        self.current_rate().ok_or_else(|| {
            LineError::InsufficientData(format!(
                "{} of {} rate samples retained",
                self.window.len(),
                self.config.min_samples()
            ))
        })
    }

    /// Retained timestamps, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.window.iter().copied()
    }

    /// Number of retained timestamps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// `max - min` of the retained timestamps.
    #[must_use]
    pub fn span(&self) -> Option<i64> {
        Some(self.window.back()? - self.window.front()?)
    }

    /// Drop every retained sample.
    pub fn clear(&mut self) {
        self.window.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
