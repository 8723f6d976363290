//! Shared utilities for flightcache
//!
//! Currently this is the tracing setup and the structured events the
//! command line emits.

pub mod tracing;

pub use self::tracing::*;
