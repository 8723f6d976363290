//! Deduplicated two-tier read-through cache
//!
//! [`SingleFlightCache`] collapses concurrent requests that share an
//! identity into one flight. The flight tries the cache tier, falls back to
//! the source tier, and records the outcome in a [`MetricsRing`].

use crate::flight::FlightGroup;
use crate::loader::{CacheLoader, LoadContext};
use crate::metrics::MetricsRing;
use flightcache_core::{Error, Result, RingConfig};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Read-through cache facade with request coalescing and windowed metrics
///
/// Share it between tasks behind an `Arc`. Dropping it closes it.
pub struct SingleFlightCache<R, V, L> {
    loader: Arc<L>,
    flights: FlightGroup<V>,
    ring: MetricsRing,
    shutdown: CancellationToken,
    closed: AtomicBool,
    _request: PhantomData<fn(R)>,
}

impl<R, V, L> SingleFlightCache<R, V, L>
where
    R: Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: CacheLoader<R, V>,
{
    /// Create a cache whose metrics ring is shaped by `config`
    pub fn new(config: &RingConfig, loader: L) -> Result<Self> {
        Self::start(config, loader, CancellationToken::new())
    }

    /// Like [`SingleFlightCache::new`], but cancelling `parent` stops the
    /// ring and cancels the context of every in-flight load
    pub fn with_parent(config: &RingConfig, loader: L, parent: &CancellationToken) -> Result<Self> {
        Self::start(config, loader, parent.child_token())
    }

    fn start(config: &RingConfig, loader: L, shutdown: CancellationToken) -> Result<Self> {
        config.validate()?;
        let ring = MetricsRing::with_parent(config.interval(), config.max_len, &shutdown)?;
        Ok(Self {
            loader: Arc::new(loader),
            flights: FlightGroup::new(),
            ring,
            shutdown,
            closed: AtomicBool::new(false),
            _request: PhantomData,
        })
    }

    /// Load the value for `request`, sharing the work with any concurrent
    /// caller that has the same identity
    pub async fn get(&self, request: R) -> Result<V> {
        self.get_with_cancel(&CancellationToken::new(), request).await
    }

    /// Like [`SingleFlightCache::get`], but stop waiting with `Cancelled`
    /// once `cancel` fires
    ///
    /// Cancelling only ends this caller's wait; the shared load keeps going
    /// for everyone else attached to it.
    pub async fn get_with_cancel(&self, cancel: &CancellationToken, request: R) -> Result<V> {
        let started = Instant::now();
        let identity = self.loader.unique_identity(&request);

        let loader = Arc::clone(&self.loader);
        let ring = self.ring.clone();
        let ticket = self.flights.join(&identity, &self.shutdown, move |ctx| {
            load_through(loader, ring, ctx, request, started)
        });
        if ticket.is_leader() {
            trace!(identity = %identity, "starting flight");
        } else {
            trace!(identity = %identity, "joined in-flight load");
        }

        let result = ticket.wait(cancel).await;
        if let Err(e) = &result {
            if e.counts_as_load_error() {
                self.ring.add_error();
            }
        }
        result
    }

    /// Invalidate the cache tier for `request`
    ///
    /// The loader's error is returned as is and nothing is recorded; on
    /// success a manual miss is counted.
    pub async fn invalidate_cache(&self, request: &R) -> std::result::Result<(), L::Error> {
        self.loader.invalidate_cache(request).await?;
        self.ring.add_manual_miss();
        Ok(())
    }

    /// Read-only access to the metrics ring
    pub fn observation_indications(&self) -> &MetricsRing {
        &self.ring
    }

    /// Number of identities currently being loaded
    pub fn in_flight_count(&self) -> usize {
        self.flights.in_flight_count()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Stop metrics rotation and cancel the context of in-flight loads
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ring.close();
        self.shutdown.cancel();
        debug!(in_flight = self.in_flight_count(), "single-flight cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.shutdown.is_cancelled()
    }
}

impl<R, V, L> Drop for SingleFlightCache<R, V, L> {
    fn drop(&mut self) {
        self.ring.close();
        self.shutdown.cancel();
    }
}

/// The body of one flight: cache tier, then source tier
async fn load_through<R, V, L>(
    loader: Arc<L>,
    ring: MetricsRing,
    ctx: LoadContext,
    request: R,
    started: Instant,
) -> Result<V>
where
    R: Send + Sync + 'static,
    V: Send + 'static,
    L: CacheLoader<R, V>,
{
    match loader.load_cache(&ctx, &request).await {
        Ok(value) => {
            ring.add_hit();
            ring.add_hit_latency(elapsed_nanos(started));
            return Ok(value);
        }
        Err(e) => {
            debug!(identity = ctx.identity(), error = %e, "cache tier missed, loading from source");
        }
    }

    match loader.load_source(&ctx, &request).await {
        Ok(value) => {
            ring.add_miss();
            ring.add_miss_latency(elapsed_nanos(started));
            Ok(value)
        }
        Err(e) => {
            debug!(identity = ctx.identity(), error = %e, "source tier failed");
            Err(Error::source_load(ctx.identity(), e))
        }
    }
}

fn elapsed_nanos(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX)
}
