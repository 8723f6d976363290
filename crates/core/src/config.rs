//! Ring configuration with precedence and validation
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_INTERVAL_MS, DEFAULT_MAX_LEN,
    FLIGHTCACHE_CONFIG_VAR, FLIGHTCACHE_INTERVAL_MS_VAR, FLIGHTCACHE_MAX_LEN_VAR,
};
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shape of the metrics ring: how often it rotates and how many slots it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Rotation interval in milliseconds
    pub interval_ms: u64,
    /// Number of ring slots
    pub max_len: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

impl RingConfig {
    /// Build a config from a `Duration`, rounding sub-millisecond parts up
    pub fn new(interval: Duration, max_len: usize) -> Self {
        let partial = u128::from(interval.subsec_nanos() % 1_000_000 != 0);
        let millis = interval.as_millis().saturating_add(partial);
        Self {
            interval_ms: u64::try_from(millis).unwrap_or(u64::MAX),
            max_len,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Reject the two shapes the ring cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::invalid_configuration("interval must be non-zero"));
        }
        if self.max_len == 0 {
            return Err(Error::invalid_configuration("max_len must be at least 1"));
        }
        Ok(())
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default configuration
    Default,
    /// Configuration file
    ConfigFile(PathBuf),
    /// Environment variable
    EnvironmentVariable(String),
    /// Command line argument
    CommandLine,
}

/// Effective configuration plus where its last override came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedConfig {
    pub ring: RingConfig,
    pub source: ConfigSource,
}

/// Partial ring settings read from a file or the environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
struct RingOverrides {
    interval_ms: Option<u64>,
    max_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    ring: RingOverrides,
}

impl RingOverrides {
    fn is_empty(&self) -> bool {
        self.interval_ms.is_none() && self.max_len.is_none()
    }

    fn apply(self, ring: &mut RingConfig) {
        if let Some(interval_ms) = self.interval_ms {
            ring.interval_ms = interval_ms;
        }
        if let Some(max_len) = self.max_len {
            ring.max_len = max_len;
        }
    }
}

/// Configuration loader that handles precedence
///
/// Defaults are overridden by the config file, which is overridden by the
/// environment, which is overridden by command line arguments.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the process environment and config file
    pub fn load() -> Result<LoadedConfig> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration reading variables through `env`
    pub fn load_with<F>(env: F) -> Result<LoadedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut loaded = LoadedConfig {
            ring: RingConfig::default(),
            source: ConfigSource::Default,
        };

        let path = match env(FLIGHTCACHE_CONFIG_VAR) {
            Some(explicit) => Some(PathBuf::from(explicit)),
            None => Self::default_config_path(&env),
        };
        if let Some(path) = path {
            if let Some(overrides) = Self::load_from_file(&path)? {
                overrides.apply(&mut loaded.ring);
                loaded.source = ConfigSource::ConfigFile(path);
            }
        }

        let env_overrides = Self::load_from_env(&env)?;
        if !env_overrides.is_empty() {
            env_overrides.apply(&mut loaded.ring);
            loaded.source = ConfigSource::EnvironmentVariable("FLIGHTCACHE_*".to_string());
        }

        loaded.ring.validate()?;
        tracing::debug!(
            interval_ms = loaded.ring.interval_ms,
            max_len = loaded.ring.max_len,
            source = ?loaded.source,
            "loaded ring configuration"
        );
        Ok(loaded)
    }

    /// Apply command line arguments (highest precedence)
    pub fn apply_cli_args(
        mut loaded: LoadedConfig,
        interval_ms: Option<u64>,
        max_len: Option<usize>,
    ) -> Result<LoadedConfig> {
        let overrides = RingOverrides {
            interval_ms,
            max_len,
        };
        if !overrides.is_empty() {
            overrides.apply(&mut loaded.ring);
            loaded.source = ConfigSource::CommandLine;
        }
        loaded.ring.validate()?;
        Ok(loaded)
    }

    fn load_from_file(path: &Path) -> Result<Option<RingOverrides>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path, "read config file", e))?;
        let file: ConfigFile = serde_json::from_str(&content)?;
        Ok(Some(file.ring))
    }

    fn load_from_env<F>(env: &F) -> Result<RingOverrides>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(RingOverrides {
            interval_ms: parse_var(env, FLIGHTCACHE_INTERVAL_MS_VAR)?,
            max_len: parse_var(env, FLIGHTCACHE_MAX_LEN_VAR)?,
        })
    }

    fn default_config_path<F>(env: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = match env("XDG_CONFIG_HOME") {
            Some(xdg_config_home) => PathBuf::from(xdg_config_home),
            None => dirs::config_dir()?,
        };
        Some(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }
}

fn parse_var<F, T>(env: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            Error::invalid_configuration(format!("{name}={raw:?} is not valid: {e}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(RingConfig::default().validate().is_ok());

        let zero_interval = RingConfig {
            interval_ms: 0,
            max_len: 3,
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(Error::InvalidConfiguration { .. })
        ));

        let zero_len = RingConfig {
            interval_ms: 10,
            max_len: 0,
        };
        assert!(matches!(
            zero_len.validate(),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let temp_dir = TempDir::new().unwrap();
        let xdg = temp_dir.path().to_str().unwrap();
        let loaded = ConfigLoader::load_with(env_from(&[("XDG_CONFIG_HOME", xdg)])).unwrap();
        assert_eq!(loaded.ring, RingConfig::default());
        assert_eq!(loaded.source, ConfigSource::Default);
    }

    #[test]
    fn test_file_then_env_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ring.json");
        std::fs::write(&path, r#"{"ring": {"interval_ms": 250, "max_len": 4}}"#).unwrap();
        let path_str = path.to_str().unwrap();

        let from_file =
            ConfigLoader::load_with(env_from(&[(FLIGHTCACHE_CONFIG_VAR, path_str)])).unwrap();
        assert_eq!(from_file.ring.interval_ms, 250);
        assert_eq!(from_file.ring.max_len, 4);
        assert_eq!(from_file.source, ConfigSource::ConfigFile(path.clone()));

        let from_env = ConfigLoader::load_with(env_from(&[
            (FLIGHTCACHE_CONFIG_VAR, path_str),
            (FLIGHTCACHE_MAX_LEN_VAR, "2"),
        ]))
        .unwrap();
        assert_eq!(from_env.ring.interval_ms, 250);
        assert_eq!(from_env.ring.max_len, 2);
        assert!(matches!(
            from_env.source,
            ConfigSource::EnvironmentVariable(_)
        ));

        let from_cli = ConfigLoader::apply_cli_args(from_env, Some(50), None).unwrap();
        assert_eq!(from_cli.ring.interval(), Duration::from_millis(50));
        assert_eq!(from_cli.ring.max_len, 2);
        assert_eq!(from_cli.source, ConfigSource::CommandLine);
    }

    #[test]
    fn test_unparseable_env_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let xdg = temp_dir.path().to_str().unwrap();
        let result = ConfigLoader::load_with(env_from(&[
            ("XDG_CONFIG_HOME", xdg),
            (FLIGHTCACHE_INTERVAL_MS_VAR, "soon"),
        ]));
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_zero_from_env_fails_validation() {
        let temp_dir = TempDir::new().unwrap();
        let xdg = temp_dir.path().to_str().unwrap();
        let result = ConfigLoader::load_with(env_from(&[
            ("XDG_CONFIG_HOME", xdg),
            (FLIGHTCACHE_MAX_LEN_VAR, "0"),
        ]));
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_malformed_file_is_a_json_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ ring: ").unwrap();
        let result =
            ConfigLoader::load_with(env_from(&[(FLIGHTCACHE_CONFIG_VAR, path.to_str().unwrap())]));
        assert!(matches!(result, Err(Error::Json { .. })));
    }

    #[test]
    fn test_ring_config_from_duration() {
        let config = RingConfig::new(Duration::from_secs(2), 3);
        assert_eq!(config.interval_ms, 2000);
        assert_eq!(config.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_sub_millisecond_interval_rounds_up() {
        let config = RingConfig::new(Duration::from_micros(500), 3);
        assert_eq!(config.interval_ms, 1);
        assert!(config.validate().is_ok());

        let config = RingConfig::new(Duration::from_micros(2_500), 3);
        assert_eq!(config.interval_ms, 3);

        let config = RingConfig::new(Duration::ZERO, 3);
        assert_eq!(config.interval_ms, 0);
        assert!(config.validate().is_err());
    }
}
