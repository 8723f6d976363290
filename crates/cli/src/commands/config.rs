use flightcache_core::{ConfigSource, LoadedConfig, Result};

pub fn execute(config: &LoadedConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", render(config));
    }
    Ok(())
}

fn render(config: &LoadedConfig) -> String {
    let source = match &config.source {
        ConfigSource::Default => "defaults".to_string(),
        ConfigSource::ConfigFile(path) => format!("config file {}", path.display()),
        ConfigSource::EnvironmentVariable(name) => format!("environment ({name})"),
        ConfigSource::CommandLine => "command line".to_string(),
    };
    format!(
        "interval_ms: {}\nmax_len:     {}\nsource:      {}\n",
        config.ring.interval_ms, config.ring.max_len, source
    )
}
