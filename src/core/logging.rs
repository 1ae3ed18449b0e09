//! Logging configuration and initialization
//!
//! This module sets up the tracing subscriber for structured logging
//! throughout the application.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Normalize a configured log level into an `EnvFilter` directive
///
/// Accepts `warning` and `critical` as aliases, ignores anything after the
/// first word and falls back to `info` for unknown values.
pub fn normalize_level(log_level: &str) -> &'static str {
    let level = log_level
        .split_whitespace()
        .next()
        .unwrap_or("info")
        .to_lowercase();

    match level.as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `log_level` when set. Production mode
/// drops ANSI colors and keeps module targets so logs stay greppable;
/// development mode uses the compact colored format.
pub fn init_logging(log_level: &str, production: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(log_level)));

    let registry = tracing_subscriber::registry().with(env_filter);

    if production {
        registry
            .with(fmt::layer().with_ansi(false).with_target(true))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_target(false))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_aliases() {
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("debug # verbose"), "debug");
        assert_eq!(normalize_level("loud"), "info");
        assert_eq!(normalize_level(""), "info");
    }
}
