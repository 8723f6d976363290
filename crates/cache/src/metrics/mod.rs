//! Cache effectiveness metrics
//!
//! This module provides the lock-free counter bucket, the time-windowed
//! ring that rotates buckets on a timer, and plain snapshots of both.

mod bucket;
mod calculation;
mod ring;
mod snapshot;

pub use bucket::CounterBucket;
pub use ring::MetricsRing;
pub use snapshot::{BucketSnapshot, RingSnapshot};
