//! Logging setup
//!
//! Logs go to stderr so that stdout stays clean for report output. The level
//! comes from `RUST_LOG` when set, otherwise from the `[logging]` config.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to the configured level
pub fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initialize the logging system
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init(config: &LoggingConfig) {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    let installed = tracing_subscriber::registry()
        .with(filter_for(config))
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %config.level, "Logging initialized");
    }
}

/// Initialize logging for tests
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test();
        init(&LoggingConfig::default());
        init(&LoggingConfig {
            level: "debug".to_string(),
        });
        tracing::info!("still logging");
    }
}
