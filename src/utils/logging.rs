//! Logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber at `level` unless `RUST_LOG` says otherwise
///
/// Calling it again after a subscriber is installed does nothing.
pub fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .try_init()
        .ok();
}

/// Map repeated `-v` flags onto a level, falling back to `default`
pub fn level_from_verbosity(verbose: u8, default: &str) -> String {
    match verbose {
        0 => default.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}
