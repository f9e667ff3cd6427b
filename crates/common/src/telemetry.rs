//! Logging setup.

use crate::config::{LogFormat, ObservabilitySettings};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber exactly once per process.
///
/// Mirrors the worker/scheduler's own `setup_logging` idiom: callers may
/// invoke this from both the daemon binary and the CLI without double
/// registering a subscriber, since `tracing_subscriber::fmt().try_init()`
/// is a no-op if a global subscriber is already set.
pub fn init_logging(config: &ObservabilitySettings) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = fmt().with_env_filter(env_filter);

    let _ = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
}
