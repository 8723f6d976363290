//! Single-flight read-through cache for flightcache
//!
//! This crate provides:
//! - Request coalescing keyed by a loader-defined identity
//! - Cache tier first, source tier on any cache failure
//! - Windowed hit/miss/error metrics rotated by a background task

pub mod flight;
pub mod loader;
pub mod metrics;
pub mod singleflight;

pub use flight::{FlightGroup, FlightTicket};
pub use loader::{CacheLoader, LoadContext};
pub use metrics::{BucketSnapshot, CounterBucket, MetricsRing, RingSnapshot};
pub use singleflight::SingleFlightCache;

pub use flightcache_core::{Error, Result, RingConfig};
