//! RTT estimation using an exponentially weighted moving average.
//!
//! EST  = round((1 - α) * EST + α * SAMPLE)
//! DEV  = round((1 - β) * DEV + β * |SAMPLE - EST|)
//! RTO  = EST + 4 * DEV
//!
//! All values are whole milliseconds. DEV is computed against the freshly
//! updated EST. The estimator starts at EST = DEV = RTO = 1 ms, so the very
//! first timing interval expires almost immediately until a sample arrives.

use std::time::Duration;

/// Weight of a new sample in the smoothed RTT.
pub const ALPHA: f64 = 0.125;
/// Weight of a new deviation in the RTT variance.
pub const BETA: f64 = 0.25;
/// Multiplier applied to the deviation when deriving the timeout.
pub const DEVIATION_FACTOR: u64 = 4;
/// Starting value for every field of the estimator, in milliseconds.
pub const INITIAL_MS: u64 = 1;

/// RTT estimator holding the last sample and the smoothed mean/variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttEstimator {
    /// Most recent RTT sample.
    sample_rtt: u64,
    /// Smoothed RTT.
    estimated_rtt: u64,
    /// Smoothed deviation of samples from `estimated_rtt`.
    deviation_rtt: u64,
    /// Current retransmission timeout.
    timeout: u64,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self {
            sample_rtt: INITIAL_MS,
            estimated_rtt: INITIAL_MS,
            deviation_rtt: INITIAL_MS,
            timeout: INITIAL_MS,
        }
    }

    /// Fold a new RTT sample (in milliseconds) into the estimate.
    pub fn update(&mut self, sample_ms: u64) {
        self.sample_rtt = sample_ms;

        let sample = sample_ms as f64;
        self.estimated_rtt =
            ((1.0 - ALPHA) * self.estimated_rtt as f64 + ALPHA * sample).round() as u64;

        let diff = sample_ms.abs_diff(self.estimated_rtt) as f64;
        self.deviation_rtt =
            ((1.0 - BETA) * self.deviation_rtt as f64 + BETA * diff).round() as u64;

        self.timeout = self
            .estimated_rtt
            .saturating_add(DEVIATION_FACTOR.saturating_mul(self.deviation_rtt));
    }

    /// Fold a sample given as a `Duration`, truncated to whole milliseconds.
    pub fn update_duration(&mut self, sample: Duration) {
        self.update(u64::try_from(sample.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn sample_rtt(&self) -> u64 {
        self.sample_rtt
    }

    pub fn estimated_rtt(&self) -> u64 {
        self.estimated_rtt
    }

    pub fn deviation_rtt(&self) -> u64 {
        self.deviation_rtt
    }

    /// Current retransmission timeout in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout
    }

    /// Current retransmission timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}
