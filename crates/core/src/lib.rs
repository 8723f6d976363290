//! Core types, errors, and configuration for `flightcache`.
//!
//! This crate holds the pieces every other crate in the workspace agrees on.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum and `Result` alias. Errors are `Clone` so a
//!   single failed flight can be delivered to every collapsed caller.
//! - **`config`**: `RingConfig` and the `ConfigLoader` precedence chain
//!   (defaults, config file, environment, command line).
//! - **`constants`**: environment variable names and defaults.

pub mod config;
pub mod constants;
pub mod errors;

pub use self::{
    config::{ConfigLoader, ConfigSource, LoadedConfig, RingConfig},
    constants::*,
    errors::{Error, Result, SharedError},
};
