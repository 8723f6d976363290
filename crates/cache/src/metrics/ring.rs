//! Time-windowed ring of counter buckets
//!
//! The ring owns `max_len` buckets plus a summary bucket. Live increments land
//! in the active slot; a background task rotates the active slot once per
//! interval and keeps the summary up to date:
//!
//! ```text
//! on tick:
//!     aging   = (active - 1 + max_len) % max_len
//!     summary -= slots[aging]
//!     summary += slots[active]
//!     next    = (active + 1) % max_len
//!     slots[next].reset()
//!     active  = next
//! ```
//!
//! A completed interval is folded into the summary on the tick right after
//! it and removed again on the tick after that, whatever `max_len` is. With
//! `max_len == 1` the subtract and the add cancel out and the summary stays
//! at zero.

use super::bucket::CounterBucket;
use super::snapshot::RingSnapshot;
use flightcache_core::{Error, Result, RingConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Windowed hit/miss/error metrics with a self-rotating active bucket
///
/// Cloning is cheap and every clone observes the same counters. Rotation
/// stops on [`MetricsRing::close`], when the parent token (if any) is
/// cancelled, or when the last clone is dropped.
#[derive(Clone)]
pub struct MetricsRing {
    inner: Arc<RingInner>,
}

struct RingInner {
    slots: Box<[CounterBucket]>,
    summary: CounterBucket,
    active: AtomicUsize,
    interval: Duration,
    shutdown: CancellationToken,
    closed: AtomicBool,
    rotation_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for RingInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.rotation_handle.get_mut().take() {
            handle.abort();
        }
    }
}

impl MetricsRing {
    /// Create a ring and start rotating it every `interval`
    ///
    /// Fails with `InvalidConfiguration` when `interval` or `max_len` is
    /// zero, and with `Runtime` when called outside a Tokio runtime.
    pub fn new(interval: Duration, max_len: usize) -> Result<Self> {
        Self::start(interval, max_len, CancellationToken::new())
    }

    /// Like [`MetricsRing::new`], but rotation also stops once `parent` is
    /// cancelled
    pub fn with_parent(
        interval: Duration,
        max_len: usize,
        parent: &CancellationToken,
    ) -> Result<Self> {
        Self::start(interval, max_len, parent.child_token())
    }

    /// Create a ring from a validated configuration
    pub fn from_config(config: &RingConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.interval(), config.max_len)
    }

    fn start(interval: Duration, max_len: usize, shutdown: CancellationToken) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::invalid_configuration("interval must be non-zero"));
        }
        if max_len == 0 {
            return Err(Error::invalid_configuration("max_len must be at least 1"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::runtime(format!("metrics ring needs a Tokio runtime to rotate: {e}"))
        })?;

        let slots: Box<[CounterBucket]> = (0..max_len).map(|_| CounterBucket::new()).collect();
        let inner = Arc::new(RingInner {
            slots,
            summary: CounterBucket::new(),
            active: AtomicUsize::new(0),
            interval,
            shutdown: shutdown.clone(),
            closed: AtomicBool::new(false),
            rotation_handle: Mutex::new(None),
        });

        let handle = runtime.spawn(run_rotation(Arc::downgrade(&inner), interval, shutdown));
        *inner.rotation_handle.lock() = Some(handle);

        tracing::debug!(
            interval_ms = interval.as_millis() as u64,
            max_len,
            "metrics ring started"
        );
        Ok(Self { inner })
    }

    /// Stop rotation permanently. Values stay readable and frozen.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.cancel();
        tracing::debug!(
            active_index = self.active_index(),
            "metrics ring closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.shutdown.is_cancelled()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn max_len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn active_index(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// The active slot: the in-progress interval
    pub fn last(&self) -> &CounterBucket {
        self.inner.active_slot()
    }

    /// The rolling aggregate maintained by rotation
    pub fn cycle(&self) -> &CounterBucket {
        &self.inner.summary
    }

    pub fn add_hit(&self) {
        self.inner.active_slot().add_hit();
    }

    pub fn add_miss(&self) {
        self.inner.active_slot().add_miss();
    }

    pub fn add_error(&self) {
        self.inner.active_slot().add_error();
    }

    pub fn add_manual_miss(&self) {
        self.inner.active_slot().add_manual_miss();
    }

    pub fn add_hit_latency(&self, nanos: i64) {
        self.inner.active_slot().add_hit_latency(nanos);
    }

    pub fn add_miss_latency(&self, nanos: i64) {
        self.inner.active_slot().add_miss_latency(nanos);
    }

    /// Take a snapshot of both views
    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            last: self.last().snapshot(),
            cycle: self.cycle().snapshot(),
            active_index: self.active_index(),
            max_len: self.max_len(),
            interval: self.interval(),
            closed: self.is_closed(),
        }
    }

    #[cfg(test)]
    pub(crate) fn rotate_now(&self) {
        self.inner.rotate();
    }
}

impl RingInner {
    fn active_slot(&self) -> &CounterBucket {
        &self.slots[self.active.load(Ordering::Acquire)]
    }

    // Only ever called from the rotation task, so rotations never overlap.
    fn rotate(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let max_len = self.slots.len();
        let current = self.active.load(Ordering::Acquire);
        let aging = (current + max_len - 1) % max_len;

        self.summary.subtract_from(&self.slots[aging]);
        self.summary.add_from(&self.slots[current]);

        let next = (current + 1) % max_len;
        self.slots[next].reset();
        self.active.store(next, Ordering::Release);

        tracing::trace!(
            from = current,
            to = next,
            cycle_hits = self.summary.hit_count(),
            cycle_misses = self.summary.miss_count(),
            cycle_errors = self.summary.error_count(),
            "metrics ring rotated"
        );
    }
}

impl std::fmt::Debug for MetricsRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRing")
            .field("interval", &self.inner.interval)
            .field("max_len", &self.max_len())
            .field("active_index", &self.active_index())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Intervals past this never elapse in practice; the timer is not armed for them.
const ROTATION_HORIZON: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

async fn run_rotation(ring: Weak<RingInner>, interval: Duration, shutdown: CancellationToken) {
    // First rotation happens one full interval after start.
    let first_tick = Instant::now()
        .checked_add(interval)
        .filter(|_| interval <= ROTATION_HORIZON);
    let Some(first_tick) = first_tick else {
        tracing::debug!(
            interval_secs = interval.as_secs(),
            "metrics ring interval beyond horizon, rotation disabled"
        );
        shutdown.cancelled().await;
        tracing::trace!("metrics ring rotation task exited");
        return;
    };
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(ring) = ring.upgrade() else { break };
                ring.rotate();
            }
        }
    }
    tracing::trace!("metrics ring rotation task exited");
}
