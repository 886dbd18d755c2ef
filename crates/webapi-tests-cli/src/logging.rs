//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the verbosity flags when it is set.

use crate::config::Verbosity;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter for a verbosity level
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()))
}

/// Install the global subscriber, logging to stderr
pub fn init(verbosity: Verbosity, ansi: bool) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(verbosity.is_verbose())
                .compact(),
        )
        .try_init();
}
