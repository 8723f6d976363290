//! Metrics snapshot functionality
//!
//! A snapshot is a plain copy of a bucket (or of both ring views) that can be
//! logged, serialized or compared in tests.

use super::calculation::ratio;
use super::bucket::CounterBucket;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A copy of one bucket's counters and derived metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub hits: i64,
    pub misses: i64,
    pub errors: i64,
    pub manual_misses: i64,
    pub hit_latency_ns: i64,
    pub miss_latency_ns: i64,
    pub total: i64,
    pub hit_rate: f64,
    pub error_rate: f64,
    pub avg_hit_latency_ns: f64,
    pub avg_miss_latency_ns: f64,
}

impl BucketSnapshot {
    /// Build a snapshot from raw counter values
    pub fn from_counts(
        hits: i64,
        misses: i64,
        errors: i64,
        manual_misses: i64,
        hit_latency_ns: i64,
        miss_latency_ns: i64,
    ) -> Self {
        let total = hits
            .wrapping_add(misses)
            .wrapping_add(errors)
            .wrapping_sub(manual_misses);
        Self {
            hits,
            misses,
            errors,
            manual_misses,
            hit_latency_ns,
            miss_latency_ns,
            total,
            hit_rate: ratio(hits, total),
            error_rate: ratio(errors, total),
            avg_hit_latency_ns: ratio(hit_latency_ns, hits),
            avg_miss_latency_ns: ratio(miss_latency_ns, misses),
        }
    }

    /// Whether nothing at all was recorded
    pub fn is_empty(&self) -> bool {
        self.hits == 0
            && self.misses == 0
            && self.errors == 0
            && self.manual_misses == 0
            && self.hit_latency_ns == 0
            && self.miss_latency_ns == 0
    }
}

impl CounterBucket {
    /// Take a snapshot of current counters
    ///
    /// Each field is read once and the derived metrics are computed from
    /// those reads, so the snapshot is self-consistent even if the bucket
    /// keeps moving.
    pub fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot::from_counts(
            self.hit_count(),
            self.miss_count(),
            self.error_count(),
            self.manual_miss_count(),
            self.hit_latency(),
            self.miss_latency(),
        )
    }
}

/// Both ring views at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingSnapshot {
    /// The active, in-progress interval
    pub last: BucketSnapshot,
    /// The rolling aggregate maintained by rotation
    pub cycle: BucketSnapshot,
    pub active_index: usize,
    pub max_len: usize,
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    pub closed: bool,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    // Rounded up so a non-zero interval never reads back as zero.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let partial = u128::from(value.subsec_nanos() % 1_000_000 != 0);
        let millis = value.as_millis().saturating_add(partial);
        serializer.serialize_u64(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
