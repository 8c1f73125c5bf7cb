//! Logging setup
//!
//! The library only emits `tracing` events; binaries and tests that want to
//! see them call [`init_logging`] once at startup.

mod config;

pub use config::LogConfig;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber.
///
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one is left alone.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.with_target),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
            .try_init()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LogConfig::default().with_filter("warn");
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
