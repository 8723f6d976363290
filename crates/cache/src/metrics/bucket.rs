//! Counter bucket structure and recording operations
//!
//! A bucket holds one interval's worth of counters. Every field is its own
//! atomic: increments never contend on a lock, and readers may observe one
//! field updated before another.

use std::sync::atomic::{AtomicI64, Ordering};

/// Six independent counters describing cache effectiveness over one interval
#[derive(Debug, Default)]
pub struct CounterBucket {
    pub(crate) hits: AtomicI64,
    pub(crate) misses: AtomicI64,
    pub(crate) errors: AtomicI64,
    pub(crate) manual_misses: AtomicI64,

    // Cumulative nanoseconds
    pub(crate) hit_latency_ns: AtomicI64,
    pub(crate) miss_latency_ns: AtomicI64,
}

impl CounterBucket {
    /// Create a zeroed bucket
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit
    pub fn add_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a source fallback that succeeded
    pub fn add_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed load
    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an explicit invalidation
    pub fn add_manual_miss(&self) {
        self.manual_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Accumulate the cost of a hit, in nanoseconds
    pub fn add_hit_latency(&self, nanos: i64) {
        self.hit_latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Accumulate the cost of a miss, in nanoseconds
    pub fn add_miss_latency(&self, nanos: i64) {
        self.miss_latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> i64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> i64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> i64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn manual_miss_count(&self) -> i64 {
        self.manual_misses.load(Ordering::Relaxed)
    }

    /// Cumulative hit latency in nanoseconds
    pub fn hit_latency(&self) -> i64 {
        self.hit_latency_ns.load(Ordering::Relaxed)
    }

    /// Cumulative miss latency in nanoseconds
    pub fn miss_latency(&self) -> i64 {
        self.miss_latency_ns.load(Ordering::Relaxed)
    }

    /// Zero every field
    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.manual_misses.store(0, Ordering::Relaxed);
        self.hit_latency_ns.store(0, Ordering::Relaxed);
        self.miss_latency_ns.store(0, Ordering::Relaxed);
    }

    /// Fold `other` into this bucket, field by field
    pub(crate) fn add_from(&self, other: &CounterBucket) {
        self.hits.fetch_add(other.hit_count(), Ordering::Relaxed);
        self.misses.fetch_add(other.miss_count(), Ordering::Relaxed);
        self.errors.fetch_add(other.error_count(), Ordering::Relaxed);
        self.manual_misses
            .fetch_add(other.manual_miss_count(), Ordering::Relaxed);
        self.hit_latency_ns
            .fetch_add(other.hit_latency(), Ordering::Relaxed);
        self.miss_latency_ns
            .fetch_add(other.miss_latency(), Ordering::Relaxed);
    }

    /// Remove `other` from this bucket, field by field
    pub(crate) fn subtract_from(&self, other: &CounterBucket) {
        self.hits.fetch_sub(other.hit_count(), Ordering::Relaxed);
        self.misses.fetch_sub(other.miss_count(), Ordering::Relaxed);
        self.errors.fetch_sub(other.error_count(), Ordering::Relaxed);
        self.manual_misses
            .fetch_sub(other.manual_miss_count(), Ordering::Relaxed);
        self.hit_latency_ns
            .fetch_sub(other.hit_latency(), Ordering::Relaxed);
        self.miss_latency_ns
            .fetch_sub(other.miss_latency(), Ordering::Relaxed);
    }
}
