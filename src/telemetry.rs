//! Tracing subscriber setup for the binaries.

use tracing_subscriber::EnvFilter;

/// Installs a compact fmt subscriber writing to standard error.
///
/// `RUST_LOG` takes precedence over `default_directive`. A subscriber that
/// is already installed is left in place.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
