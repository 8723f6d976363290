use flightcache_core::FLIGHTCACHE_LOG_VAR;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};

const DEFAULT_DIRECTIVE: &str = "info";

/// Initialize the tracing system
///
/// The filter comes from `FLIGHTCACHE_LOG`, then `RUST_LOG`, then `info`.
/// Output goes to stderr so stdout stays clean for reports. ANSI colors are
/// only used when stderr is a terminal.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let directive = filter_directive(|name| std::env::var(name).ok());
    let filter =
        EnvFilter::try_new(&directive).or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVE))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_tty())
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Pick the filter directive from the environment
pub fn filter_directive<F>(env: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [FLIGHTCACHE_LOG_VAR, "RUST_LOG"]
        .into_iter()
        .filter_map(|name| env(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}

/// Check if we're running in a TTY environment
fn is_tty() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stderr())
}

/// Create a span for one command line invocation
pub fn command_span(name: &str) -> Span {
    span!(Level::INFO, "command", command = %name)
}

/// Create a span for one simulation round
pub fn round_span(round: usize, total_rounds: usize) -> Span {
    span!(Level::INFO, "round", round = %round, total_rounds = %total_rounds)
}

/// Emit a structured event once a simulation round has finished
pub fn round_completed(round: usize, requests: usize, failures: usize, duration_ms: u64) {
    if failures == 0 {
        info!(
            round = %round,
            requests = %requests,
            duration_ms = %duration_ms,
            "round_completed"
        );
    } else {
        warn!(
            round = %round,
            requests = %requests,
            failures = %failures,
            duration_ms = %duration_ms,
            "round_completed_with_failures"
        );
    }
}
