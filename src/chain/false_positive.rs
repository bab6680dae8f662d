//! Bloom-filter false-positive rate estimation
//!
//! A double exponential smoother over transactions: the level decays by
//! `1 - ALPHA` for every filtered transaction and rises by `ALPHA` for every
//! false positive, while a trend term tracks how fast the level moves.

/// Level smoothing per transaction
pub const FP_ESTIMATOR_ALPHA: f64 = 0.0001;

/// Trend smoothing per transaction
pub const FP_ESTIMATOR_BETA: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FalsePositiveEstimator {
    rate: f64,
    trend: f64,
    prev_rate: f64,
}

impl FalsePositiveEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` matched transactions that turned out to be irrelevant
    pub fn track_false_positives(&mut self, count: u32) {
        self.rate += FP_ESTIMATOR_ALPHA * count as f64;
    }

    /// Record `count` transactions that passed through the filter
    pub fn track_filtered_transactions(&mut self, count: u32) {
        // Decay underflows to zero long before i32::MAX transactions
        let n = i32::try_from(count).unwrap_or(i32::MAX);

        let alpha_decay = (1.0 - FP_ESTIMATOR_ALPHA).powi(n);
        self.rate *= alpha_decay;

        let beta_decay = (1.0 - FP_ESTIMATOR_BETA).powi(n);
        self.trend = FP_ESTIMATOR_BETA * count as f64 * (self.rate - self.prev_rate)
            + beta_decay * self.trend;

        self.rate += alpha_decay * self.trend;
        self.prev_rate = self.rate;
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
