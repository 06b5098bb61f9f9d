//! Tracing initialization shared by the fleet binaries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{FleetError, Result};

/// Initialize the tracing subscriber with environment-based configuration
///
/// Uses standard RUST_LOG environment variable for filtering:
/// - `RUST_LOG=debug` - Set global level
/// - `RUST_LOG=gsync_api=info,gsync_orchestrator=debug` - Set per-crate levels
///
/// Uses RUST_LOG_FORMAT for output format (optional):
/// - `json` - JSON formatted output
/// - `pretty` - Pretty formatted output
/// - `compact` - Compact single-line output (default)
pub fn init() -> Result<()> {
    init_with_defaults("info")
}

/// Initialize with a default filter if RUST_LOG is not set
pub fn init_with_defaults(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format.as_str() {
        "json" => registry.with(fmt::layer().with_ansi(false).json()).try_init(),
        "pretty" => registry.with(fmt::layer().pretty()).try_init(),
        _ => registry.with(fmt::layer().compact()).try_init(),
    };

    result.map_err(|e| FleetError::runtime("tracing initialization", e.to_string()))
}

/// Initialize for testing; safe to call from several tests.
pub fn init_for_testing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info_span};

    #[test]
    fn test_init_for_testing_is_idempotent() {
        init_for_testing();
        init_for_testing();

        let span = info_span!("lifecycle", profile = "alpha");
        let _enter = span.enter();
        debug!("message within span");
    }
}
