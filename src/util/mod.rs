//! Utility module
//!
//! This module provides the logging setup used by binaries and demos built on
//! the library.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{Error, Result};

/// Installs a fmt subscriber filtered by `RUST_LOG`, falling back to `default_level`.
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install tracing subscriber: {}", e)))
}
