/// Constants used throughout the flightcache codebase
// Environment variable names
pub const FLIGHTCACHE_CONFIG_VAR: &str = "FLIGHTCACHE_CONFIG";
pub const FLIGHTCACHE_INTERVAL_MS_VAR: &str = "FLIGHTCACHE_INTERVAL_MS";
pub const FLIGHTCACHE_MAX_LEN_VAR: &str = "FLIGHTCACHE_MAX_LEN";
pub const FLIGHTCACHE_LOG_VAR: &str = "FLIGHTCACHE_LOG";

// Config file location, relative to the user config directory
pub const CONFIG_DIR_NAME: &str = "flightcache";
pub const CONFIG_FILE_NAME: &str = "config.json";

// Ring defaults
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MAX_LEN: usize = 6;
