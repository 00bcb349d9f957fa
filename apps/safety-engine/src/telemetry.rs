//! Tracing setup.
//!
//! # Configuration
//!
//! - `RUST_LOG`: log filter (default: `info`)
//! - `NODE_ENV`: `development` enables ANSI colors and hides targets

use tracing_subscriber::EnvFilter;

/// Initialize console tracing with an env filter.
///
/// Safe to call once per process; a second call is a no-op because the
/// global subscriber is already set.
pub fn init_tracing() {
    let is_development = std::env::var("NODE_ENV")
        .map(|v| v == "development")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(!is_development)
        .with_ansi(is_development)
        .try_init();
}
