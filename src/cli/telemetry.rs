//! Tracing initialization for the service.
//!
//! Builds a `tracing-subscriber` registry with an `EnvFilter` derived from the
//! CLI verbosity flag (or `RUST_LOG` when set) and a fmt layer. Setting
//! `CUSTODIA_LOG_FORMAT=json` switches the fmt layer to JSON output for
//! log shippers.

use anyhow::Result;
use std::env;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(level: Option<Level>) -> Result<()> {
    let filter = env_filter(level);

    let json = env::var("CUSTODIA_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }

    Ok(())
}

fn env_filter(level: Option<Level>) -> EnvFilter {
    // RUST_LOG wins when present so operators can scope noisy modules;
    // otherwise the -v count decides the default level.
    if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = level.map_or("error", |level| match level {
            Level::WARN => "warn",
            Level::INFO => "info",
            Level::DEBUG => "debug",
            Level::TRACE => "trace",
            Level::ERROR => "error",
        });
        EnvFilter::new(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_to_error() {
        temp_env::with_var("RUST_LOG", None::<&str>, || {
            let filter = env_filter(None);
            assert_eq!(filter.to_string(), "error");
        });
    }

    #[test]
    fn filter_uses_verbosity_level() {
        temp_env::with_var("RUST_LOG", None::<&str>, || {
            let filter = env_filter(Some(Level::DEBUG));
            assert_eq!(filter.to_string(), "debug");
        });
    }

    #[test]
    fn filter_prefers_rust_log() {
        temp_env::with_var("RUST_LOG", Some("custodia=trace"), || {
            let filter = env_filter(Some(Level::WARN));
            assert_eq!(filter.to_string(), "custodia=trace");
        });
    }
}
