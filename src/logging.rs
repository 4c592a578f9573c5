//! Logging and tracing setup for the provider binary.
//!
//! All logs are written to **stderr**: stdout is reserved for the handshake
//! line the host reads when it spawns the provider.
//!
//! `RUST_LOG` takes the usual `EnvFilter` directives.
//!
//! ```bash
//! # Trace every ARM request and LRO poll
//! RUST_LOG=hemmer_provider_azurerm_mysql::arm=debug ./hemmer-provider-azurerm-mysql
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter applied when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the stderr subscriber at `info` unless `RUST_LOG` says otherwise.
///
/// Panics when called twice; tests use [`try_init_logging`].
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LOG_LEVEL);
}

/// As [`init_logging`], falling back to `default_level`.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize logging, returning false if a subscriber is already set.
///
/// Useful in tests where several cases may race to install a subscriber.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_LOG_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so only the
    // filter parsing is exercised here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_LEVEL).is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_azurerm_mysql=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_azurerm_mysql::arm=trace").is_ok());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
