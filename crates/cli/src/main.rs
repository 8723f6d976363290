use clap::Parser;
use flightcache_core::ConfigLoader;

mod commands;
mod execute;

use commands::Commands;

#[derive(Parser)]
#[command(name = "flightcache")]
#[command(about = "Drive and inspect a single-flight read-through cache", long_about = None)]
#[command(version)]
struct Cli {
    /// Metrics rotation interval in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Number of slots in the metrics ring
    #[arg(long, global = true)]
    max_len: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Parse command-line arguments
    let cli = Cli::parse();

    if let Err(e) = flightcache_utils::init() {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    // Defaults, then config file, then environment, then flags
    let loaded = ConfigLoader::load()?;
    let loaded = ConfigLoader::apply_cli_args(loaded, cli.interval_ms, cli.max_len)?;

    cli.command.execute(loaded).await?;
    Ok(())
}
