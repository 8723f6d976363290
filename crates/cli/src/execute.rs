use crate::commands::Commands;
use flightcache_core::{LoadedConfig, Result};
use tracing::Instrument;

impl Commands {
    pub async fn execute(self, config: LoadedConfig) -> Result<()> {
        let span = flightcache_utils::command_span(self.name());

        async move {
            match self {
                Commands::Simulate(args) => {
                    crate::commands::simulate::execute(&config, args).await
                }
                Commands::Config { json } => crate::commands::config::execute(&config, json),
            }
        }
        .instrument(span)
        .await
    }

    fn name(&self) -> &'static str {
        match self {
            Commands::Simulate(_) => "simulate",
            Commands::Config { .. } => "config",
        }
    }
}
