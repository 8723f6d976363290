//! Derived metrics calculation
//!
//! Rates and averages are computed from independent field reads, so a value
//! read while increments are in flight may mix fields from slightly
//! different moments.

use super::bucket::CounterBucket;

impl CounterBucket {
    /// Requests that count toward the rates: hits, misses and errors, minus
    /// explicit invalidations
    pub fn total(&self) -> i64 {
        self.hit_count()
            .wrapping_add(self.miss_count())
            .wrapping_add(self.error_count())
            .wrapping_sub(self.manual_miss_count())
    }

    /// Get current hit rate
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hit_count(), self.total())
    }

    /// Get current error rate
    pub fn error_rate(&self) -> f64 {
        ratio(self.error_count(), self.total())
    }

    /// Average hit latency in nanoseconds
    pub fn avg_hit_latency(&self) -> f64 {
        ratio(self.hit_latency(), self.hit_count())
    }

    /// Average miss latency in nanoseconds
    pub fn avg_miss_latency(&self) -> f64 {
        ratio(self.miss_latency(), self.miss_count())
    }
}

pub(crate) fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
