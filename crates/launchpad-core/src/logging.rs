//! Tracing setup for embedders that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

use crate::config::RunnerConfig;

/// Builds the filter: `RUST_LOG` when set and valid, else `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs a global fmt subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already set, in which case
/// nothing changes. Safe to call more than once.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// [`init_tracing`] with the configured `log_filter` as the default.
pub fn init_from(config: &RunnerConfig) -> bool {
    init_tracing(&config.log_filter)
}
