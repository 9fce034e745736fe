//! Tracing setup for the companion binary.
//!
//! Progress that matters to the user goes through the notifier; tracing is
//! diagnostics only, written to stderr and filtered by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn,companion=info` so step comments are
/// visible without extra flags.
///
/// # Example
/// ```bash
/// RUST_LOG=companion=debug companion run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,companion=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
