//! Loader contract implemented by the application
//!
//! The orchestrator never touches storage itself. It asks a [`CacheLoader`]
//! for a dedup identity, for a cheap cache-tier read, for an authoritative
//! source-tier read, and for explicit invalidation.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context handed to the cache and source tiers of one flight
///
/// The token is scoped to the shared execution: it is cancelled once the
/// flight resolves or the owning cache is closed, never because a single
/// waiter gave up.
#[derive(Debug, Clone)]
pub struct LoadContext {
    identity: Arc<str>,
    token: CancellationToken,
}

impl LoadContext {
    pub(crate) fn new(identity: &str, token: CancellationToken) -> Self {
        Self {
            identity: Arc::from(identity),
            token,
        }
    }

    /// Dedup identity of the flight being served
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the flight's context is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Capabilities a read-through cache needs from its caller
///
/// `R` is the request type and `V` the loaded value. Any error from
/// [`CacheLoader::load_cache`] is treated as a miss and triggers the source
/// tier; an error from [`CacheLoader::load_source`] is terminal for the
/// flight.
#[async_trait]
pub trait CacheLoader<R, V>: Send + Sync + 'static
where
    R: Send + Sync + 'static,
    V: Send + 'static,
{
    type Error: std::error::Error + Send + Sync + 'static;

    /// Deterministic dedup key for `request`. Must not block.
    fn unique_identity(&self, request: &R) -> String;

    /// Cheap read from the cache tier
    async fn load_cache(&self, ctx: &LoadContext, request: &R) -> Result<V, Self::Error>;

    /// Authoritative read from the source of truth
    async fn load_source(&self, ctx: &LoadContext, request: &R) -> Result<V, Self::Error>;

    /// Drop whatever the cache tier holds for `request`
    async fn invalidate_cache(&self, request: &R) -> Result<(), Self::Error>;
}
