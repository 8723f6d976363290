use clap::Subcommand;

pub mod config;
pub mod simulate;

use self::simulate::SimulateArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Drive the cache with an in-memory loader and report its metrics
    #[command(visible_alias = "sim")]
    Simulate(SimulateArgs),

    /// Show the effective ring configuration and where it came from
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}
