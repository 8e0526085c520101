//! Tracing subscriber setup for hosts that embed the pipeline.

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber.
///
/// `RUST_LOG` wins over `default_directive` (e.g. `"info"` or
/// `"nanomatrix=debug"`). Returns false if a global subscriber was already
/// installed, which makes repeated calls from tests harmless.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init()
        .is_ok()
}
