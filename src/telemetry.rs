//! Logging initialization.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects `debug` over `warn`.
/// Safe to call more than once (later calls are no-ops).
pub fn init(verbose: bool) {
    let default_level = if verbose { "tesoro=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
