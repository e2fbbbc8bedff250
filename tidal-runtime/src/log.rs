//! Logging setup.
//!
//! Tidal logs through `tracing`. Embedders that already install a
//! subscriber need nothing from this module; [`init`] installs a compact fmt
//! subscriber driven by `RUST_LOG`, falling back to the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install a global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.is_ok()
}
