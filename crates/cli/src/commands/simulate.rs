//! Load simulation against an in-memory two-tier store
//!
//! Every round fires `requests` concurrent gets spread over `keys`
//! identities. Values land in the cache tier after their first source load.
//! Between rounds every `cache_miss_every`-th key is invalidated, and every
//! `source_error_every`-th source call fails.

use async_trait::async_trait;
use clap::Args;
use dashmap::DashMap;
use flightcache_cache::{CacheLoader, LoadContext, RingSnapshot, SingleFlightCache};
use flightcache_core::{Error, LoadedConfig, Result, RingConfig};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::Instrument;

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Concurrent requests per round
    #[arg(long, default_value = "100")]
    pub requests: usize,

    /// Number of distinct keys the requests are spread over
    #[arg(long, default_value = "10")]
    pub keys: usize,

    /// Latency of the cache tier in milliseconds
    #[arg(long, default_value = "5")]
    pub cache_latency_ms: u64,

    /// Latency of the source tier in milliseconds
    #[arg(long, default_value = "50")]
    pub source_latency_ms: u64,

    /// Invalidate every Nth key between rounds (0 disables)
    #[arg(long, default_value = "3")]
    pub cache_miss_every: usize,

    /// Fail every Nth source load (0 disables)
    #[arg(long, default_value = "0")]
    pub source_error_every: u64,

    /// Number of rounds
    #[arg(long, default_value = "3")]
    pub rounds: usize,

    /// Pause between rounds in milliseconds
    #[arg(long, default_value = "0")]
    pub round_gap_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulatedError {
    #[error("key {0} is not cached")]
    NotCached(String),
    #[error("source load #{call} for key {key} failed")]
    SourceFailed { key: String, call: u64 },
}

/// Two-tier store held entirely in memory
pub struct SimulatedLoader {
    cached: DashMap<String, String>,
    cache_latency: Duration,
    source_latency: Duration,
    source_error_every: u64,
    source_calls: AtomicU64,
}

impl SimulatedLoader {
    pub fn new(args: &SimulateArgs) -> Self {
        Self {
            cached: DashMap::new(),
            cache_latency: Duration::from_millis(args.cache_latency_ms),
            source_latency: Duration::from_millis(args.source_latency_ms),
            source_error_every: args.source_error_every,
            source_calls: AtomicU64::new(0),
        }
    }

    pub fn source_calls(&self) -> u64 {
        self.source_calls.load(Ordering::Relaxed)
    }
}

fn key_name(key: usize) -> String {
    format!("key-{key}")
}

#[async_trait]
impl CacheLoader<usize, String> for SimulatedLoader {
    type Error = SimulatedError;

    fn unique_identity(&self, request: &usize) -> String {
        key_name(*request)
    }

    async fn load_cache(
        &self,
        ctx: &LoadContext,
        _request: &usize,
    ) -> std::result::Result<String, Self::Error> {
        sleep(self.cache_latency).await;
        self.cached
            .get(ctx.identity())
            .map(|value| value.clone())
            .ok_or_else(|| SimulatedError::NotCached(ctx.identity().to_string()))
    }

    async fn load_source(
        &self,
        ctx: &LoadContext,
        request: &usize,
    ) -> std::result::Result<String, Self::Error> {
        sleep(self.source_latency).await;
        let call = self.source_calls.fetch_add(1, Ordering::Relaxed) + 1;
        if self.source_error_every > 0 && call % self.source_error_every == 0 {
            return Err(SimulatedError::SourceFailed {
                key: ctx.identity().to_string(),
                call,
            });
        }
        let value = format!("value-{request}-v{call}");
        self.cached.insert(ctx.identity().to_string(), value.clone());
        Ok(value)
    }

    async fn invalidate_cache(&self, request: &usize) -> std::result::Result<(), Self::Error> {
        self.cached.remove(&key_name(*request));
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: usize,
    pub requests: usize,
    pub failures: usize,
    pub invalidated: usize,
    pub duration_ms: u64,
    pub metrics: RingSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub ring: RingConfig,
    pub source_calls: u64,
    pub rounds: Vec<RoundReport>,
}

pub async fn execute(config: &LoadedConfig, args: SimulateArgs) -> Result<()> {
    let report = run(&config.ring, &args).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

/// Run the simulation and collect one report per round
pub async fn run(ring: &RingConfig, args: &SimulateArgs) -> Result<SimulationReport> {
    if args.keys == 0 {
        return Err(Error::invalid_configuration("--keys must be at least 1"));
    }

    let cache = SingleFlightCache::new(ring, SimulatedLoader::new(args))?;
    let mut rounds = Vec::with_capacity(args.rounds);

    for round in 1..=args.rounds {
        let invalidated = if round > 1 {
            invalidate_every(&cache, args.keys, args.cache_miss_every).await
        } else {
            0
        };

        let started = Instant::now();
        let failures = fire_round(&cache, args.requests, args.keys)
            .instrument(flightcache_utils::round_span(round, args.rounds))
            .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        flightcache_utils::round_completed(round, args.requests, failures, duration_ms);

        rounds.push(RoundReport {
            round,
            requests: args.requests,
            failures,
            invalidated,
            duration_ms,
            metrics: cache.observation_indications().snapshot(),
        });

        if args.round_gap_ms > 0 && round < args.rounds {
            sleep(Duration::from_millis(args.round_gap_ms)).await;
        }
    }

    let source_calls = cache.loader().source_calls();
    cache.close();
    Ok(SimulationReport {
        ring: *ring,
        source_calls,
        rounds,
    })
}

async fn fire_round(
    cache: &SingleFlightCache<usize, String, SimulatedLoader>,
    requests: usize,
    keys: usize,
) -> usize {
    let calls = (0..requests).map(|i| cache.get(i % keys));
    futures::future::join_all(calls)
        .await
        .into_iter()
        .filter(|result| result.is_err())
        .count()
}

async fn invalidate_every(
    cache: &SingleFlightCache<usize, String, SimulatedLoader>,
    keys: usize,
    every: usize,
) -> usize {
    if every == 0 {
        return 0;
    }
    let mut invalidated = 0;
    for key in (0..keys).step_by(every) {
        match cache.invalidate_cache(&key).await {
            Ok(()) => invalidated += 1,
            Err(e) => tracing::warn!(key, error = %e, "invalidation failed"),
        }
    }
    invalidated
}

fn render(report: &SimulationReport) -> String {
    let mut out = format!(
        "ring: interval {}ms, {} slots\n\n",
        report.ring.interval_ms, report.ring.max_len
    );
    out.push_str(
        "round  view   hits  misses  errors  manual  hit_rate  err_rate  avg_hit_ms  avg_miss_ms\n",
    );
    for round in &report.rounds {
        for (view, bucket) in [("last", &round.metrics.last), ("cycle", &round.metrics.cycle)] {
            out.push_str(&format!(
                "{:>5}  {:<5} {:>5} {:>7} {:>7} {:>7} {:>8.1}% {:>8.1}% {:>11.2} {:>12.2}\n",
                round.round,
                view,
                bucket.hits,
                bucket.misses,
                bucket.errors,
                bucket.manual_misses,
                bucket.hit_rate * 100.0,
                bucket.error_rate * 100.0,
                bucket.avg_hit_latency_ns / 1_000_000.0,
                bucket.avg_miss_latency_ns / 1_000_000.0,
            ));
        }
    }
    out.push_str(&format!("\nsource calls: {}\n", report.source_calls));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            requests: 20,
            keys: 5,
            cache_latency_ms: 1,
            source_latency_ms: 10,
            cache_miss_every: 2,
            source_error_every: 0,
            rounds: 2,
            round_gap_ms: 0,
            json: false,
        }
    }

    fn quiet_ring() -> RingConfig {
        RingConfig::new(Duration::from_secs(3600), 6)
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_collapse_per_key() {
        let report = run(&quiet_ring(), &args()).await.unwrap();

        let first = &report.rounds[0];
        assert_eq!(first.failures, 0);
        assert_eq!(first.invalidated, 0);
        assert_eq!(first.metrics.last.misses, 5);
        assert_eq!(first.metrics.last.hits, 0);

        // Keys 0, 2 and 4 are invalidated before round two.
        let second = &report.rounds[1];
        assert_eq!(second.invalidated, 3);
        assert_eq!(second.metrics.last.hits, 2);
        assert_eq!(second.metrics.last.misses, 8);
        assert_eq!(second.metrics.last.manual_misses, 3);
        assert_eq!(report.source_calls, 8);
        assert!(!second.metrics.closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_errors_reach_every_waiter() {
        let args = SimulateArgs {
            source_error_every: 5,
            rounds: 1,
            ..args()
        };
        let report = run(&quiet_ring(), &args).await.unwrap();

        // Exactly one of the five flights fails, and four requests share it.
        let round = &report.rounds[0];
        assert_eq!(round.failures, 4);
        assert_eq!(round.metrics.last.errors, 4);
        assert_eq!(round.metrics.last.misses, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_keys_is_rejected() {
        let args = SimulateArgs { keys: 0, ..args() };
        let err = run(&quiet_ring(), &args).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_lists_both_views() {
        let report = run(&quiet_ring(), &args()).await.unwrap();
        let text = render(&report);
        assert!(text.contains("ring: interval 3600000ms, 6 slots"));
        assert_eq!(text.lines().filter(|l| l.contains(" last ")).count(), 2);
        assert_eq!(text.lines().filter(|l| l.contains(" cycle ")).count(), 2);
        assert!(text.contains("source calls: 8"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rounds"][1]["metrics"]["last"]["hits"], 2);
    }
}
