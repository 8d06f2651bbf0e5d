//! Tracing subscriber setup for the fieldqueue binary.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_level`. `verbose` raises the
/// fallback to `debug` for this crate.
pub fn init(default_level: &str, verbose: bool) {
    let fallback = if verbose {
        format!("{default_level},fieldqueue=debug")
    } else {
        default_level.to_string()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // A subscriber may already be installed (tests, embedding apps).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
