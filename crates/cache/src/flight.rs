//! In-flight load tracker for request coalescing
//!
//! When several callers ask for the same identity at once, the first one
//! starts a flight and every later one attaches to it:
//! 1. The first caller spawns the shared execution as its own task and
//!    publishes a shared future for its outcome.
//! 2. Later callers clone that shared future and wait on it.
//! 3. When the execution finishes (or panics), the task removes the
//!    identity, so the next caller starts a fresh flight.
//!
//! Waiters are counted per flight for observation only. The count never
//! decides when a flight ends: a waiter that stops waiting only drops its own
//! interest, and the shared execution runs to completion even with none left.

use crate::loader::LoadContext;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flightcache_core::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type FlightOutcome<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Tracks in-flight loads keyed by identity
pub struct FlightGroup<V> {
    flights: Arc<DashMap<String, Flight<V>>>,
    next_id: AtomicU64,
}

struct Flight<V> {
    id: u64,
    outcome: FlightOutcome<V>,
    // Diagnostic; removal is driven by `FlightGuard` alone.
    waiters: Arc<AtomicUsize>,
}

/// A caller's attachment to a flight, obtained from [`FlightGroup::join`]
pub struct FlightTicket<V> {
    identity: String,
    outcome: FlightOutcome<V>,
    leader: bool,
    _waiter: WaiterGuard,
}

/// Decrements the flight's waiter count when the caller goes away
struct WaiterGuard {
    waiters: Arc<AtomicUsize>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Lives inside the spawned execution. Dropping it, on completion or on
/// panic, frees the identity and cancels the flight's load context.
struct FlightGuard<V> {
    flights: Arc<DashMap<String, Flight<V>>>,
    identity: String,
    id: u64,
    token: CancellationToken,
}

impl<V> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        self.flights
            .remove_if(&self.identity, |_, flight| flight.id == self.id);
        self.token.cancel();
    }
}

impl<V> FlightGroup<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attach to the flight for `identity`, starting it with `work` if none
    /// is in progress
    ///
    /// `work` runs at most once per flight, inside a spawned task, with a
    /// load context whose token is a child of `parent`. Must be called from
    /// within a Tokio runtime.
    pub fn join<F, Fut>(&self, identity: &str, parent: &CancellationToken, work: F) -> FlightTicket<V>
    where
        F: FnOnce(LoadContext) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        match self.flights.entry(identity.to_string()) {
            Entry::Occupied(occupied) => {
                let flight = occupied.get();
                flight.waiters.fetch_add(1, Ordering::AcqRel);
                FlightTicket {
                    identity: identity.to_string(),
                    outcome: flight.outcome.clone(),
                    leader: false,
                    _waiter: WaiterGuard {
                        waiters: Arc::clone(&flight.waiters),
                    },
                }
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let token = parent.child_token();
                let guard = FlightGuard {
                    flights: Arc::clone(&self.flights),
                    identity: identity.to_string(),
                    id,
                    token: token.clone(),
                };

                let execution = work(LoadContext::new(identity, token));
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    execution.await
                });

                let key = identity.to_string();
                let outcome = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(join_error) if join_error.is_panic() => {
                            Err(Error::aborted(key, "shared load panicked"))
                        }
                        Err(_) => Err(Error::aborted(key, "shared load was cancelled")),
                    }
                }
                .boxed()
                .shared();

                let waiters = Arc::new(AtomicUsize::new(1));
                vacant.insert(Flight {
                    id,
                    outcome: outcome.clone(),
                    waiters: Arc::clone(&waiters),
                });

                FlightTicket {
                    identity: identity.to_string(),
                    outcome,
                    leader: true,
                    _waiter: WaiterGuard { waiters },
                }
            }
        }
    }

    /// Number of identities currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.flights.len()
    }

    /// Number of callers currently waiting on the flight for `identity`
    ///
    /// Diagnostic only. A flight with zero waiters still runs to completion.
    pub fn waiters(&self, identity: &str) -> usize {
        self.flights
            .get(identity)
            .map(|flight| flight.waiters.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl<V> Default for FlightGroup<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FlightTicket<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Whether this caller started the flight
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Wait for the flight's outcome, or until `cancel` fires
    ///
    /// Cancellation only affects this caller.
    pub async fn wait(self, cancel: &CancellationToken) -> Result<V> {
        let outcome = self.outcome.clone();
        tokio::select! {
            biased;
            result = outcome => result,
            _ = cancel.cancelled() => Err(Error::cancelled(self.identity.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ready(value: &'static str) -> impl FnOnce(LoadContext) -> BoxFuture<'static, Result<String>> {
        move |_ctx| async move { Ok(value.to_string()) }.boxed()
    }

    #[tokio::test]
    async fn test_first_join_leads() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();

        let ticket = group.join("user:1", &root, ready("a"));
        assert!(ticket.is_leader());
        assert_eq!(ticket.identity(), "user:1");
        assert_eq!(group.in_flight_count(), 1);
        assert_eq!(group.waiters("user:1"), 1);

        assert_eq!(ticket.wait(&root).await.unwrap(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_join_follows_and_shares_outcome() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();

        let leader = group.join("k", &root, |_ctx| {
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok("shared".to_string())
            }
            .boxed()
        });
        let follower = group.join("k", &root, |_ctx| -> BoxFuture<'static, Result<String>> {
            panic!("follower work must never run")
        });

        assert!(!follower.is_leader());
        assert_eq!(group.in_flight_count(), 1);
        assert_eq!(group.waiters("k"), 2);

        let (a, b) = tokio::join!(leader.wait(&root), follower.wait(&root));
        assert_eq!(a.unwrap(), "shared");
        assert_eq!(b.unwrap(), "shared");
        assert_eq!(group.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_identity_freed_after_resolution() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();

        let first = group.join("k", &root, ready("one"));
        assert_eq!(first.wait(&root).await.unwrap(), "one");
        assert_eq!(group.in_flight_count(), 0);

        let second = group.join("k", &root, ready("two"));
        assert!(second.is_leader());
        assert_eq!(second.wait(&root).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_different_identities_are_independent() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();

        let a = group.join("a", &root, |_ctx| {
            futures::future::pending::<Result<String>>().boxed()
        });
        let b = group.join("b", &root, |_ctx| {
            futures::future::pending::<Result<String>>().boxed()
        });
        assert!(a.is_leader());
        assert!(b.is_leader());
        assert_eq!(group.in_flight_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_leaves_flight_running() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();

        let leader = group.join("k", &root, |_ctx| {
            async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok("done".to_string())
            }
            .boxed()
        });
        let quitter = group.join("k", &root, ready("unused"));
        assert_eq!(group.waiters("k"), 2);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = quitter.wait(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { ref identity } if identity == "k"));
        assert_eq!(group.waiters("k"), 1);

        assert_eq!(leader.wait(&root).await.unwrap(), "done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flight_outlives_its_waiters() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let leader = group.join("k", &root, move |_ctx| {
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let _ = tx.send(());
                Ok("finished".to_string())
            }
            .boxed()
        });
        let follower = group.join("k", &root, ready("unused"));
        drop(leader);
        drop(follower);

        assert_eq!(group.waiters("k"), 0);
        assert_eq!(group.in_flight_count(), 1);

        rx.await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(group.in_flight_count(), 0);
        assert_eq!(group.waiters("k"), 0);
    }

    #[tokio::test]
    async fn test_panicking_execution_aborts_every_waiter() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();

        let leader = group.join("boom", &root, |_ctx| {
            async {
                tokio::task::yield_now().await;
                let value: Option<String> = None;
                Ok(value.expect("loader exploded"))
            }
            .boxed()
        });
        let follower = group.join("boom", &root, ready("unused"));

        let (a, b) = tokio::join!(leader.wait(&root), follower.wait(&root));
        assert!(matches!(a, Err(Error::Aborted { .. })));
        assert!(matches!(b, Err(Error::Aborted { .. })));
        assert_eq!(group.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_load_context_cancelled_on_resolution() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let ticket = group.join("k", &root, move |ctx| {
            let _ = tx.send(ctx.clone());
            async { Ok("v".to_string()) }.boxed()
        });
        let ctx = rx.await.unwrap();
        assert_eq!(ctx.identity(), "k");

        ticket.wait(&root).await.unwrap();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_load_context() {
        let group = FlightGroup::<String>::new();
        let root = CancellationToken::new();

        let ticket = group.join("k", &root, |ctx| {
            async move {
                ctx.cancelled().await;
                Err(Error::cancelled(ctx.identity()))
            }
            .boxed()
        });
        root.cancel();

        let caller = CancellationToken::new();
        let err = ticket.wait(&caller).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
